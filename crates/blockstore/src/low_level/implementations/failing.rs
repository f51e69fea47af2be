use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;
use std::fmt::{self, Debug};
use std::sync::Mutex;
use thiserror::Error;

use crate::low_level::{BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter};
use crate::{BlockId, InvalidBlockSizeError, RemoveResult, TryCreateResult};
use cryblocks_utils::{
    async_drop::{AsyncDrop, AsyncDropGuard},
    data::Data,
};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Injected failure when modifying block {block_id}")]
pub struct InjectedWriteFailure {
    pub block_id: BlockId,
}

/// Wraps a BlockStore and lets writes fail on demand. After [FailingBlockStore::fail_after]
/// was called, the given number of modifying calls (creating, storing or removing a block)
/// still go through and every one after that fails with [InjectedWriteFailure].
/// Reads are never affected.
pub struct FailingBlockStore<B: BlockStore> {
    underlying_store: AsyncDropGuard<B>,

    // None means writes don't fail
    remaining_writes: Mutex<Option<u64>>,
}

impl<B: BlockStore> FailingBlockStore<B> {
    pub fn new(underlying: AsyncDropGuard<B>) -> AsyncDropGuard<Self> {
        AsyncDropGuard::new(Self {
            underlying_store: underlying,
            remaining_writes: Mutex::new(None),
        })
    }

    pub fn fail_after(&self, num_successful_writes: u64) {
        *self.remaining_writes.lock().unwrap() = Some(num_successful_writes);
    }

    pub fn stop_failing(&self) {
        *self.remaining_writes.lock().unwrap() = None;
    }

    pub fn underlying_block_store(&self) -> &B {
        &self.underlying_store
    }

    fn _start_write(&self, block_id: &BlockId) -> Result<(), InjectedWriteFailure> {
        match &mut *self.remaining_writes.lock().unwrap() {
            None => Ok(()),
            Some(0) => Err(InjectedWriteFailure {
                block_id: *block_id,
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<B: BlockStore> BlockStoreReader for FailingBlockStore<B> {
    async fn exists(&self, id: &BlockId) -> Result<bool> {
        self.underlying_store.exists(id).await
    }

    async fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        self.underlying_store.load(id).await
    }

    async fn num_blocks(&self) -> Result<u64> {
        self.underlying_store.num_blocks().await
    }

    fn block_size_from_physical_block_size(
        &self,
        block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError> {
        self.underlying_store
            .block_size_from_physical_block_size(block_size)
    }

    async fn all_blocks(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        self.underlying_store.all_blocks().await
    }
}

#[async_trait]
impl<B: BlockStore> BlockStoreDeleter for FailingBlockStore<B> {
    async fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        self._start_write(id)?;
        self.underlying_store.remove(id).await
    }
}

#[async_trait]
impl<B: BlockStore> BlockStoreWriter for FailingBlockStore<B> {
    async fn try_create(&self, id: &BlockId, data: &[u8]) -> Result<TryCreateResult> {
        self._start_write(id)?;
        self.underlying_store.try_create(id, data).await
    }

    async fn store(&self, id: &BlockId, data: &[u8]) -> Result<()> {
        self._start_write(id)?;
        self.underlying_store.store(id, data).await
    }
}

impl<B: BlockStore> Debug for FailingBlockStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailingBlockStore({:?})", *self.underlying_store)
    }
}

#[async_trait]
impl<B: BlockStore> AsyncDrop for FailingBlockStore<B> {
    type Error = anyhow::Error;
    async fn async_drop_impl(&mut self) -> Result<()> {
        self.underlying_store.async_drop().await
    }
}

impl<B: BlockStore> BlockStore for FailingBlockStore<B> {}
