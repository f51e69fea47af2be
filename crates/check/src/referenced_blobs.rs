use anyhow::Result;
use async_trait::async_trait;

use cryblocks_blobstore::{BlobId, BlobOnBlocks};
use cryblocks_blockstore::BlockStore;

/// Knows which other blobs a blob refers to, e.g. the entries of a directory blob.
/// The check walks these references starting at the root blob to find all reachable blobs.
#[async_trait]
pub trait ReferencedBlobs<B: BlockStore>: Sync {
    async fn referenced_blobs(&self, blob: &mut BlobOnBlocks<'_, B>) -> Result<Vec<BlobId>>;
}

/// For stores where the root blob is the only blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferencedBlobs;

#[async_trait]
impl<B: BlockStore> ReferencedBlobs<B> for NoReferencedBlobs {
    async fn referenced_blobs(&self, _blob: &mut BlobOnBlocks<'_, B>) -> Result<Vec<BlobId>> {
        Ok(vec![])
    }
}
