use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use futures::future::LocalBoxFuture;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tempdir::TempDir;

use cryblocks_blobstore::{Blob, BlobId, BlobOnBlocks, BlobStore, BlobStoreOnBlocks, DataNode, BLOBID_LEN};
use cryblocks_blockstore::{BlockId, BlockStore, EncryptedBlockStore, OnDiskBlockStore};
use cryblocks_check::{check_blobstore, CheckArgs, CheckResult, ReferencedBlobs};
use cryblocks_crypto::symmetric::{CipherDef, EncryptionKey, XChaCha20Poly1305};
use cryblocks_utils::testutils::DataFixture;

pub type TestBlockStore = EncryptedBlockStore<XChaCha20Poly1305, OnDiskBlockStore>;

pub const BLOCKSIZE_BYTES: u64 = 512;

/// Treats the content of a blob as a list of blob ids, like a very simple directory.
pub struct BlobIdList;

#[async_trait]
impl<B: BlockStore> ReferencedBlobs<B> for BlobIdList {
    async fn referenced_blobs(&self, blob: &mut BlobOnBlocks<'_, B>) -> Result<Vec<BlobId>> {
        let content = blob.read_all().await?;
        content.chunks(BLOBID_LEN).map(BlobId::from_slice).collect()
    }
}

/// An encrypted on-disk store in a temporary directory.
pub struct StoreFixture {
    basedir: TempDir,
    key_hex: String,
}

impl StoreFixture {
    pub fn new() -> Self {
        Self {
            basedir: TempDir::new("cryblocks-check-test").unwrap(),
            key_hex: EncryptionKey::generate_random(XChaCha20Poly1305::KEY_SIZE).to_hex(),
        }
    }

    pub fn basedir(&self) -> &Path {
        self.basedir.path()
    }

    pub async fn with_blobstore<R>(
        &self,
        f: impl for<'a> FnOnce(&'a BlobStoreOnBlocks<TestBlockStore>) -> LocalBoxFuture<'a, R>,
    ) -> R {
        let key = EncryptionKey::from_hex(&self.key_hex).unwrap();
        let blockstore = EncryptedBlockStore::new(
            OnDiskBlockStore::new(self.basedir().to_path_buf()),
            XChaCha20Poly1305::new(key).unwrap(),
        );
        let mut blobstore = BlobStoreOnBlocks::new(blockstore, Byte::from_u64(BLOCKSIZE_BYTES))
            .await
            .unwrap();
        let result = f(&blobstore).await;
        blobstore.async_drop().await.unwrap();
        result
    }

    pub async fn create_blob(&self, num_bytes: usize, seed: u64) -> BlobId {
        self.with_blobstore(|store| {
            Box::pin(async move {
                let mut blob = store.create().await.unwrap();
                blob.write(&DataFixture::new(seed).get(num_bytes), 0)
                    .await
                    .unwrap();
                blob.flush().await.unwrap();
                blob.id()
            })
        })
        .await
    }

    /// Creates a blob that [BlobIdList] reads as referencing `referenced`.
    pub async fn create_blob_referencing(&self, referenced: &[BlobId]) -> BlobId {
        let content: Vec<u8> = referenced
            .iter()
            .flat_map(|blob_id| blob_id.data().iter().copied())
            .collect();
        self.with_blobstore(|store| {
            Box::pin(async move {
                let mut blob = store.create().await.unwrap();
                blob.write(&content, 0).await.unwrap();
                blob.flush().await.unwrap();
                blob.id()
            })
        })
        .await
    }

    /// All nodes of the blob, in no particular order
    pub async fn nodes_of_blob(&self, blob_id: BlobId) -> Vec<BlockId> {
        self.with_blobstore(|store| {
            Box::pin(async move {
                let blob = store.load(&blob_id).await.unwrap().unwrap();
                let nodes: Vec<BlockId> = blob.all_blocks().try_collect().await.unwrap();
                nodes
            })
        })
        .await
    }

    pub async fn leaves_of_blob(&self, blob_id: BlobId) -> Vec<BlockId> {
        let nodes = self.nodes_of_blob(blob_id).await;
        self.with_blobstore(|store| {
            Box::pin(async move {
                let mut leaves = Vec::new();
                for node_id in nodes {
                    if Some(0) == store.load_block_depth(&node_id).await.unwrap() {
                        leaves.push(node_id);
                    }
                }
                leaves
            })
        })
        .await
    }

    pub async fn children_of_node(&self, node_id: BlockId) -> Vec<BlockId> {
        self.with_blobstore(|store| {
            Box::pin(async move {
                match store.tree_store().load_node(&node_id).await.unwrap().unwrap() {
                    DataNode::Inner(inner) => inner.children().collect(),
                    DataNode::Leaf(_) => vec![],
                }
            })
        })
        .await
    }

    pub async fn parent_of_node(&self, blob_id: BlobId, node_id: BlockId) -> BlockId {
        for candidate in self.nodes_of_blob(blob_id).await {
            if self.children_of_node(candidate).await.contains(&node_id) {
                return candidate;
            }
        }
        panic!("Node {node_id} has no parent in blob {blob_id}");
    }

    pub fn block_path(&self, block_id: &BlockId) -> PathBuf {
        let block_id = block_id.to_hex_upper();
        self.basedir().join(&block_id[..3]).join(&block_id[3..])
    }

    pub fn remove_block(&self, block_id: &BlockId) {
        std::fs::remove_file(self.block_path(block_id)).unwrap();
    }

    /// Flips a bit in the authentication tag at the end of the ciphertext
    pub fn corrupt_block(&self, block_id: &BlockId) {
        let path = self.block_path(block_id);
        let mut content = std::fs::read(&path).unwrap();
        *content.last_mut().unwrap() ^= 0x01;
        std::fs::write(&path, content).unwrap();
    }

    pub async fn check(
        &self,
        root_blob: BlobId,
        referenced_blobs: impl ReferencedBlobs<TestBlockStore> + 'static,
    ) -> CheckResult {
        self.with_blobstore(|store| {
            Box::pin(async move {
                check_blobstore(store, root_blob, &referenced_blobs)
                    .await
                    .unwrap()
            })
        })
        .await
    }

    pub fn args(&self, root_blob: BlobId) -> CheckArgs {
        CheckArgs {
            basedir: self.basedir().to_path_buf(),
            cipher: "xchacha20-poly1305".to_string(),
            key: self.key_hex.clone(),
            blocksize: Byte::from_u64(BLOCKSIZE_BYTES),
            root_blob,
        }
    }
}
