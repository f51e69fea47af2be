use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;

use cryblocks_blockstore::{BlockId, BlockStore, InvalidBlockSizeError, RemoveResult};
use cryblocks_utils::{
    async_drop::{AsyncDrop, AsyncDropGuard},
    data::Data,
};

mod errors;
pub use errors::{CapacityExceededError, CorruptLayoutError, NodeNotFoundError};

mod layout;
pub use layout::{NodeLayout, MAX_DEPTH, MIN_BLOCK_SIZE_BYTES};

mod node_block;

mod data_node;
pub use data_node::{DataInnerNode, DataLeafNode, DataNode};

#[cfg(test)]
pub(crate) mod testutils;

/// Stores tree nodes as blocks of a fixed size in an underlying [BlockStore].
///
/// Nodes returned from here are detached from the store. Changes made to them
/// are only written back when they're flushed.
#[derive(Debug)]
pub struct DataNodeStore<B: BlockStore> {
    block_store: AsyncDropGuard<B>,
    layout: NodeLayout,
}

impl<B: BlockStore> DataNodeStore<B> {
    pub async fn new(
        mut block_store: AsyncDropGuard<B>,
        physical_block_size: Byte,
    ) -> Result<AsyncDropGuard<Self>> {
        let block_size_bytes = match Self::_block_size_bytes(&block_store, physical_block_size) {
            Ok(ok) => ok,
            Err(err) => {
                block_store.async_drop().await?;
                return Err(err);
            }
        };

        Ok(AsyncDropGuard::new(Self {
            block_store,
            layout: NodeLayout { block_size_bytes },
        }))
    }

    fn _block_size_bytes(block_store: &B, physical_block_size: Byte) -> Result<u32> {
        let block_size = block_store.block_size_from_physical_block_size(physical_block_size)?;
        let block_size_bytes = u32::try_from(block_size.as_u64()).map_err(|_| {
            InvalidBlockSizeError::new(format!(
                "Block size {} doesn't fit into 32 bits",
                block_size
            ))
        })?;
        if block_size_bytes < MIN_BLOCK_SIZE_BYTES {
            // Nodes need room for the header and for at least two children, otherwise no tree can grow
            return Err(InvalidBlockSizeError::new(format!(
                "Tried to create a DataNodeStore with block size {} (physical: {}) but must be at least {}",
                block_size_bytes,
                physical_block_size.as_u64(),
                MIN_BLOCK_SIZE_BYTES,
            ))
            .into());
        }
        Ok(block_size_bytes)
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub(crate) fn block_store(&self) -> &B {
        &self.block_store
    }

    /// `Ok(None)` if there is no block with this id. A block that exists but isn't
    /// a valid node fails with a [CorruptLayoutError].
    pub async fn load(&self, block_id: &BlockId) -> Result<Option<DataNode>> {
        match self.block_store.load(block_id).await? {
            None => Ok(None),
            Some(data) => Ok(Some(DataNode::parse(*block_id, data, &self.layout)?)),
        }
    }

    pub async fn create_new_leaf_node(&self, data: &[u8]) -> Result<DataLeafNode> {
        let block_data = data_node::serialize_leaf_node(data, &self.layout)?;
        let block_id = self.block_store.create(&block_data).await?;
        self._parse_created_leaf(block_id, block_data)
    }

    /// Like [DataNodeStore::create_new_leaf_node] but with a given id. `Ok(None)` if that id is taken.
    pub async fn try_create_new_leaf_node(
        &self,
        block_id: BlockId,
        data: &[u8],
    ) -> Result<Option<DataLeafNode>> {
        let block_data = data_node::serialize_leaf_node(data, &self.layout)?;
        match self.block_store.try_create(&block_id, &block_data).await? {
            cryblocks_blockstore::TryCreateResult::SuccessfullyCreated => {
                self._parse_created_leaf(block_id, block_data).map(Some)
            }
            cryblocks_blockstore::TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists => {
                Ok(None)
            }
        }
    }

    fn _parse_created_leaf(&self, block_id: BlockId, block_data: Data) -> Result<DataLeafNode> {
        match DataNode::parse(block_id, block_data, &self.layout)? {
            DataNode::Leaf(leaf) => Ok(leaf),
            DataNode::Inner(_) => bail!("Serialized a leaf node but it parsed as an inner node"),
        }
    }

    pub async fn create_new_inner_node(
        &self,
        depth: u8,
        children: &[BlockId],
    ) -> Result<DataInnerNode> {
        let block_data = data_node::serialize_inner_node(depth, children, &self.layout)?;
        let block_id = self.block_store.create(&block_data).await?;
        match DataNode::parse(block_id, block_data, &self.layout)? {
            DataNode::Inner(inner) => Ok(inner),
            DataNode::Leaf(_) => bail!("Serialized an inner node but it parsed as a leaf node"),
        }
    }

    /// Stores a new node with the same content as `source`. If `source` has unflushed
    /// changes, the copy contains them.
    pub async fn create_new_node_as_copy_from(&self, source: &DataNode) -> Result<DataNode> {
        let source_data = source.raw_blockdata();
        assert_eq!(
            self.layout.block_size_bytes as usize,
            source_data.len(),
            "Source node has {} bytes but we expected {}. Is it from the same DataNodeStore?",
            source_data.len(),
            self.layout.block_size_bytes,
        );
        let block_id = self.block_store.create(source_data).await?;
        Ok(DataNode::parse(block_id, source_data.clone(), &self.layout)?)
    }

    pub async fn overwrite_with_leaf_node(&self, block_id: &BlockId, data: &[u8]) -> Result<()> {
        let block_data = data_node::serialize_leaf_node(data, &self.layout)?;
        self.block_store.store(block_id, &block_data).await
    }

    /// Fails with [NodeNotFoundError] if there is no such node.
    pub async fn remove_by_id(&self, block_id: &BlockId) -> Result<()> {
        match self.block_store.remove(block_id).await? {
            RemoveResult::SuccessfullyRemoved => Ok(()),
            RemoveResult::NotRemovedBecauseItDoesntExist => Err(NodeNotFoundError {
                block_id: *block_id,
            }
            .into()),
        }
    }

    /// Remove a loaded node, dropping any changes that weren't flushed yet.
    pub async fn remove(&self, node: DataNode) -> Result<()> {
        let block_id = node.into_block().discard();
        self.remove_by_id(&block_id).await
    }

    pub async fn flush_node(&self, node: &mut DataNode) -> Result<()> {
        node.flush(&*self.block_store)
            .await
            .with_context(|| format!("Failed to flush node {}", node.block_id()))
    }

    pub async fn num_nodes(&self) -> Result<u64> {
        self.block_store.num_blocks().await
    }

    /// Number of payload bytes per leaf, i.e. the granularity blobs are stored with.
    pub fn virtual_block_size_bytes(&self) -> u32 {
        self.layout.max_bytes_per_leaf()
    }

    pub async fn all_nodes(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        self.block_store.all_blocks().await
    }
}

#[async_trait]
impl<B: BlockStore> AsyncDrop for DataNodeStore<B> {
    type Error = anyhow::Error;

    async fn async_drop_impl(&mut self) -> Result<(), Self::Error> {
        self.block_store.async_drop().await
    }
}
