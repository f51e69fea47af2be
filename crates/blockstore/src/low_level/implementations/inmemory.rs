use anyhow::{anyhow, Result};
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::hash_map::{Entry, HashMap};
use std::fmt::{self, Debug};
use std::sync::RwLock;

use crate::low_level::{BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter};
use crate::{BlockId, InvalidBlockSizeError, RemoveResult, TryCreateResult};
use cryblocks_utils::{
    async_drop::{AsyncDrop, AsyncDropGuard},
    data::Data,
};

/// Keeps all blocks in a hash map. Used in tests and as a baseline for the other stores.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockId, Data>>,
}

impl InMemoryBlockStore {
    pub fn new() -> AsyncDropGuard<Self> {
        AsyncDropGuard::new(Self {
            blocks: RwLock::new(HashMap::new()),
        })
    }

    /// Change the stored bytes of a block directly, bypassing any wrapping store.
    /// Returns `false` if the block doesn't exist.
    #[cfg(any(test, feature = "testutils"))]
    pub fn modify_raw_block(&self, id: &BlockId, f: impl FnOnce(&mut Data)) -> Result<bool> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        match blocks.get_mut(id) {
            Some(data) => {
                f(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl BlockStoreReader for InMemoryBlockStore {
    async fn exists(&self, id: &BlockId) -> Result<bool> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        Ok(blocks.contains_key(id))
    }

    async fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        Ok(blocks.get(id).cloned())
    }

    async fn num_blocks(&self) -> Result<u64> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        Ok(blocks.len() as u64)
    }

    fn block_size_from_physical_block_size(
        &self,
        block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError> {
        Ok(block_size)
    }

    async fn all_blocks(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        let blocks = self
            .blocks
            .read()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        let ids: Vec<BlockId> = blocks.keys().copied().collect();
        Ok(stream::iter(ids.into_iter().map(Ok)).boxed())
    }
}

#[async_trait]
impl BlockStoreDeleter for InMemoryBlockStore {
    async fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        match blocks.remove(id) {
            Some(_) => Ok(RemoveResult::SuccessfullyRemoved),
            None => Ok(RemoveResult::NotRemovedBecauseItDoesntExist),
        }
    }
}

#[async_trait]
impl BlockStoreWriter for InMemoryBlockStore {
    async fn try_create(&self, id: &BlockId, data: &[u8]) -> Result<TryCreateResult> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        match blocks.entry(*id) {
            Entry::Occupied(_) => Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists),
            Entry::Vacant(entry) => {
                entry.insert(data.into());
                Ok(TryCreateResult::SuccessfullyCreated)
            }
        }
    }

    async fn store(&self, id: &BlockId, data: &[u8]) -> Result<()> {
        let mut blocks = self
            .blocks
            .write()
            .map_err(|_| anyhow!("Failed to acquire lock"))?;
        blocks.insert(*id, data.into());
        Ok(())
    }
}

impl Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InMemoryBlockStore")
    }
}

#[async_trait]
impl AsyncDrop for InMemoryBlockStore {
    type Error = anyhow::Error;
    async fn async_drop_impl(&mut self) -> Result<()> {
        Ok(())
    }
}

impl BlockStore for InMemoryBlockStore {}
