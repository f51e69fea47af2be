use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;
use std::fmt::Debug;

use crate::{BlockId, InvalidBlockSizeError, RemoveResult, TryCreateResult};
use cryblocks_utils::{async_drop::AsyncDrop, data::Data};

mod implementations;
pub use implementations::{EncryptedBlockStore, InMemoryBlockStore, IntegrityError, OnDiskBlockStore};
#[cfg(any(test, feature = "testutils"))]
pub use implementations::{FailingBlockStore, InjectedWriteFailure};

#[async_trait]
pub trait BlockStoreReader {
    async fn exists(&self, id: &BlockId) -> Result<bool>;

    /// `Ok(None)` if the block doesn't exist.
    async fn load(&self, id: &BlockId) -> Result<Option<Data>>;

    async fn num_blocks(&self) -> Result<u64>;

    /// How many bytes of a block with the given physical size can be used by callers
    /// after this store and the stores it wraps took their overhead.
    fn block_size_from_physical_block_size(
        &self,
        block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError>;

    /// Stream every block id in the store, in no particular order.
    async fn all_blocks(&self) -> Result<BoxStream<'static, Result<BlockId>>>;
}

#[async_trait]
pub trait BlockStoreDeleter {
    async fn remove(&self, id: &BlockId) -> Result<RemoveResult>;
}

#[async_trait]
pub trait BlockStoreWriter: Sync {
    /// Store the block if no block with this id exists yet. Never overwrites.
    async fn try_create(&self, id: &BlockId, data: &[u8]) -> Result<TryCreateResult>;

    /// Store the block, overwriting it if it already exists.
    async fn store(&self, id: &BlockId, data: &[u8]) -> Result<()>;

    /// Store the block under a new random id and return that id.
    async fn create(&self, data: &[u8]) -> Result<BlockId> {
        loop {
            let block_id = BlockId::new_random();
            match self.try_create(&block_id, data).await? {
                TryCreateResult::SuccessfullyCreated => return Ok(block_id),
                TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists => {
                    // Astronomically unlikely, but try again with another id
                    log::warn!("Randomly generated block id {block_id} already exists");
                }
            }
        }
    }
}

pub trait BlockStore:
    BlockStoreReader
    + BlockStoreWriter
    + BlockStoreDeleter
    + AsyncDrop<Error = anyhow::Error>
    + Debug
    + Send
    + Sync
{
}
