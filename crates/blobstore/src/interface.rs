use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;
use std::fmt::Debug;

use cryblocks_blockstore::{BlockId, BLOCKID_LEN};
use cryblocks_utils::data::Data;

use crate::{BlobId, RemoveResult};

pub const BLOBID_LEN: usize = BLOCKID_LEN;

/// A variable-length byte sequence. Callers serialize mutations of the same blob,
/// which the `&mut self` receivers enforce.
#[async_trait]
pub trait Blob: Sized + Debug + Send {
    fn id(&self) -> BlobId;
    async fn num_bytes(&mut self) -> Result<u64>;

    /// Growing fills the new bytes with zeroes.
    async fn resize(&mut self, new_num_bytes: u64) -> Result<()>;

    async fn read_all(&mut self) -> Result<Data>;

    /// Fails if the region isn't completely inside the blob.
    async fn read(&mut self, target: &mut [u8], offset: u64) -> Result<()>;

    /// Reads as much of the region as exists and returns how many bytes that was.
    async fn try_read(&mut self, target: &mut [u8], offset: u64) -> Result<usize>;

    /// Writing past the end grows the blob, any gap is filled with zeroes.
    async fn write(&mut self, source: &[u8], offset: u64) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    async fn num_nodes(&mut self) -> Result<u64>;

    async fn remove(self) -> Result<()>;

    fn all_blocks(&self) -> BoxStream<'_, Result<BlockId>>;
}

#[async_trait]
pub trait BlobStore {
    type ConcreteBlob<'a>: Blob + Send + Sync
    where
        Self: 'a;

    async fn create(&self) -> Result<Self::ConcreteBlob<'_>>;

    /// `Ok(None)` if a blob or any other block with this id already exists.
    async fn try_create(&self, id: &BlobId) -> Result<Option<Self::ConcreteBlob<'_>>>;

    async fn load(&self, id: &BlobId) -> Result<Option<Self::ConcreteBlob<'_>>>;
    async fn remove_by_id(&self, id: &BlobId) -> Result<RemoveResult>;
    async fn num_nodes(&self) -> Result<u64>;

    // logical means "space we can use" as opposed to "space it takes on the disk" (i.e. logical is without headers, checksums, ...)
    fn logical_block_size_bytes(&self) -> Byte;
}
