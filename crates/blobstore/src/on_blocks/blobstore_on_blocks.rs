use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use std::fmt;

use super::blob_on_blocks::BlobOnBlocks;
use super::data_tree_store::DataTreeStore;
use crate::{Blob, BlobId, BlobStore, RemoveResult};
use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::async_drop::{AsyncDrop, AsyncDropGuard};

pub struct BlobStoreOnBlocks<B: BlockStore> {
    tree_store: AsyncDropGuard<DataTreeStore<B>>,
}

impl<B: BlockStore> BlobStoreOnBlocks<B> {
    /// `physical_block_size` is the size of the blocks in `blockstore` before that store takes its overhead.
    pub async fn new(
        blockstore: AsyncDropGuard<B>,
        physical_block_size: Byte,
    ) -> Result<AsyncDropGuard<Self>> {
        Ok(AsyncDropGuard::new(Self {
            tree_store: DataTreeStore::new(blockstore, physical_block_size).await?,
        }))
    }

    /// `Ok(None)` if the block doesn't exist. Works for any node, not just blob roots.
    pub async fn load_block_depth(&self, id: &BlockId) -> Result<Option<u8>> {
        self.tree_store.load_block_depth(id).await
    }

    /// Access to the trees backing the blobs, for tools that inspect the node structure.
    pub fn tree_store(&self) -> &DataTreeStore<B> {
        &self.tree_store
    }
}

#[async_trait]
impl<B: BlockStore> BlobStore for BlobStoreOnBlocks<B> {
    type ConcreteBlob<'a>
        = BlobOnBlocks<'a, B>
    where
        B: 'a;

    async fn create(&self) -> Result<Self::ConcreteBlob<'_>> {
        let blob = BlobOnBlocks::new(self.tree_store.create_tree().await?);
        log::debug!("Created blob {}", blob.id());
        Ok(blob)
    }

    async fn try_create(&self, id: &BlobId) -> Result<Option<Self::ConcreteBlob<'_>>> {
        Ok(self
            .tree_store
            .try_create_tree(id.root)
            .await?
            .map(BlobOnBlocks::new))
    }

    async fn load(&self, id: &BlobId) -> Result<Option<Self::ConcreteBlob<'_>>> {
        Ok(self
            .tree_store
            .load_tree(id.root)
            .await?
            .map(BlobOnBlocks::new))
    }

    async fn remove_by_id(&self, id: &BlobId) -> Result<RemoveResult> {
        let result = self.tree_store.remove_tree_by_id(id.root).await?;
        log::debug!("Removing blob {id}: {result:?}");
        Ok(result)
    }

    async fn num_nodes(&self) -> Result<u64> {
        self.tree_store.num_nodes().await
    }

    fn logical_block_size_bytes(&self) -> Byte {
        Byte::from_u64(u64::from(self.tree_store.virtual_block_size_bytes()))
    }
}

impl<B: BlockStore> fmt::Debug for BlobStoreOnBlocks<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobStoreOnBlocks")
    }
}

#[async_trait]
impl<B: BlockStore> AsyncDrop for BlobStoreOnBlocks<B> {
    type Error = anyhow::Error;

    async fn async_drop_impl(&mut self) -> Result<(), Self::Error> {
        self.tree_store.async_drop().await
    }
}
