use anyhow::{Context, Result};
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;
use std::fmt::{self, Debug};
use thiserror::Error;

use crate::low_level::{BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter};
use crate::{
    BlockId, InvalidBlockSizeError, Overhead, RemoveResult, TryCreateResult, BLOCKID_LEN,
};
use cryblocks_crypto::symmetric::CipherDef;
use cryblocks_utils::{
    async_drop::{AsyncDrop, AsyncDropGuard},
    data::Data,
};

const FORMAT_VERSION_HEADER: &[u8; 2] = &1u16.to_ne_bytes();

/// A block failed authentication when it was loaded: it was modified, corrupted, or
/// written with a different key.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Integrity violation in block {block_id}: {reason}")]
pub struct IntegrityError {
    pub block_id: BlockId,
    pub reason: String,
}

/// Encrypts and authenticates every block before handing it to the underlying store.
///
/// Stored layout: `FORMAT_VERSION_HEADER || cipher output`. The plaintext handed to the
/// cipher is `block id || block data`, so a ciphertext moved to a different block id
/// fails to load. Block ids stay visible in the underlying store.
pub struct EncryptedBlockStore<C: 'static + CipherDef, B: BlockStore> {
    underlying_block_store: AsyncDropGuard<B>,
    cipher: C,
}

impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> EncryptedBlockStore<C, B> {
    pub fn new(underlying_block_store: AsyncDropGuard<B>, cipher: C) -> AsyncDropGuard<Self> {
        AsyncDropGuard::new(Self {
            underlying_block_store,
            cipher,
        })
    }

    /// Access to the stored ciphertext, e.g. to simulate tampering.
    #[cfg(any(test, feature = "testutils"))]
    pub fn underlying_block_store(&self) -> &B {
        &self.underlying_block_store
    }

    fn overhead() -> Overhead {
        Overhead::new(Byte::from_u64(
            (FORMAT_VERSION_HEADER.len()
                + C::CIPHERTEXT_OVERHEAD_PREFIX
                + BLOCKID_LEN
                + C::CIPHERTEXT_OVERHEAD_SUFFIX) as u64,
        ))
    }

    fn _encrypt(&self, block_id: &BlockId, plaintext: &[u8]) -> Result<Data> {
        let mut data = Data::allocate(
            FORMAT_VERSION_HEADER.len() + C::CIPHERTEXT_OVERHEAD_PREFIX,
            BLOCKID_LEN + plaintext.len(),
            C::CIPHERTEXT_OVERHEAD_SUFFIX,
        );
        data[..BLOCKID_LEN].copy_from_slice(block_id.data());
        data[BLOCKID_LEN..].copy_from_slice(plaintext);
        // Encryption is CPU bound, let tokio move other tasks off this worker while it runs
        let mut ciphertext = tokio::task::block_in_place(move || self.cipher.encrypt(data))?;
        ciphertext.grow_region(FORMAT_VERSION_HEADER.len(), 0);
        ciphertext[..FORMAT_VERSION_HEADER.len()].copy_from_slice(FORMAT_VERSION_HEADER);
        Ok(ciphertext)
    }

    fn _decrypt(&self, block_id: &BlockId, mut ciphertext: Data) -> Result<Data, IntegrityError> {
        if !ciphertext.starts_with(FORMAT_VERSION_HEADER) {
            let found = &ciphertext[..ciphertext.len().min(FORMAT_VERSION_HEADER.len())];
            return Err(IntegrityError {
                block_id: *block_id,
                reason: format!(
                    "Expected format version header {:?} but found {:?}",
                    FORMAT_VERSION_HEADER, found,
                ),
            });
        }
        ciphertext.shrink_to_subregion(FORMAT_VERSION_HEADER.len()..);
        let mut plaintext = tokio::task::block_in_place(move || self.cipher.decrypt(ciphertext))
            .map_err(|err| IntegrityError {
                block_id: *block_id,
                reason: err.to_string(),
            })?;
        if plaintext.len() < BLOCKID_LEN {
            return Err(IntegrityError {
                block_id: *block_id,
                reason: format!(
                    "Decrypted block has {} bytes, too small to contain a block id",
                    plaintext.len()
                ),
            });
        }
        let stored_block_id = BlockId::from_array(
            plaintext[..BLOCKID_LEN]
                .try_into()
                .expect("Slice has exactly BLOCKID_LEN bytes"),
        );
        if stored_block_id != *block_id {
            return Err(IntegrityError {
                block_id: *block_id,
                reason: format!(
                    "Block was written as block {} and moved here",
                    stored_block_id
                ),
            });
        }
        plaintext.shrink_to_subregion(BLOCKID_LEN..);
        Ok(plaintext)
    }
}

#[async_trait]
impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> BlockStoreReader
    for EncryptedBlockStore<C, B>
{
    async fn exists(&self, id: &BlockId) -> Result<bool> {
        self.underlying_block_store.exists(id).await
    }

    async fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let loaded = self
            .underlying_block_store
            .load(id)
            .await
            .context("EncryptedBlockStore failed to load the block from the underlying block store")?;
        match loaded {
            None => Ok(None),
            Some(ciphertext) => {
                let plaintext = self._decrypt(id, ciphertext)?;
                Ok(Some(plaintext))
            }
        }
    }

    async fn num_blocks(&self) -> Result<u64> {
        self.underlying_block_store.num_blocks().await
    }

    fn block_size_from_physical_block_size(
        &self,
        physical_block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError> {
        let block_size = self
            .underlying_block_store
            .block_size_from_physical_block_size(physical_block_size)?;
        Self::overhead().usable_block_size_from_physical_block_size(block_size)
    }

    async fn all_blocks(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        self.underlying_block_store.all_blocks().await
    }
}

#[async_trait]
impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> BlockStoreDeleter
    for EncryptedBlockStore<C, B>
{
    async fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        self.underlying_block_store.remove(id).await
    }
}

#[async_trait]
impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> BlockStoreWriter
    for EncryptedBlockStore<C, B>
{
    async fn try_create(&self, id: &BlockId, data: &[u8]) -> Result<TryCreateResult> {
        let ciphertext = self._encrypt(id, data)?;
        self.underlying_block_store.try_create(id, &ciphertext).await
    }

    async fn store(&self, id: &BlockId, data: &[u8]) -> Result<()> {
        let ciphertext = self._encrypt(id, data)?;
        self.underlying_block_store.store(id, &ciphertext).await
    }
}

impl<C: 'static + CipherDef, B: BlockStore> Debug for EncryptedBlockStore<C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlockStore({:?})", *self.underlying_block_store)
    }
}

#[async_trait]
impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> AsyncDrop for EncryptedBlockStore<C, B> {
    type Error = anyhow::Error;
    async fn async_drop_impl(&mut self) -> Result<()> {
        self.underlying_block_store.async_drop().await
    }
}

impl<C: 'static + CipherDef + Send + Sync, B: BlockStore> BlockStore for EncryptedBlockStore<C, B> {}
