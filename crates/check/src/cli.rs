use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use byte_unit::Byte;
use std::path::PathBuf;

use crate::args::CheckArgs;
use crate::checks::CheckResult;
use crate::referenced_blobs::NoReferencedBlobs;
use crate::runner::check_blobstore;
use cryblocks_blobstore::{BlobId, BlobStoreOnBlocks};
use cryblocks_blockstore::{EncryptedBlockStore, OnDiskBlockStore};
use cryblocks_crypto::symmetric::{lookup_cipher_async, AsyncCipherCallback, CipherDef, EncryptionKey};
use cryblocks_utils::with_async_drop;

/// Opens the store described by `args` and checks it.
pub async fn run(args: CheckArgs) -> Result<CheckResult> {
    if !args.basedir.is_dir() {
        bail!("Base directory {} doesn't exist", args.basedir.display());
    }
    let key = EncryptionKey::from_hex(&args.key).context("Invalid encryption key")?;
    log::info!(
        "Checking {} with cipher {} and block size {}",
        args.basedir.display(),
        args.cipher,
        args.blocksize,
    );
    lookup_cipher_async(
        &args.cipher,
        CheckRunner {
            basedir: args.basedir,
            key,
            blocksize: args.blocksize,
            root_blob: args.root_blob,
        },
    )
    .await?
}

struct CheckRunner {
    basedir: PathBuf,
    key: EncryptionKey,
    blocksize: Byte,
    root_blob: BlobId,
}

#[async_trait]
impl AsyncCipherCallback for CheckRunner {
    type Result = Result<CheckResult>;

    async fn callback<C: CipherDef + Send + Sync + 'static>(self) -> Self::Result {
        let cipher = C::new(self.key)?;
        let blockstore = EncryptedBlockStore::new(OnDiskBlockStore::new(self.basedir), cipher);
        let blobstore = BlobStoreOnBlocks::new(blockstore, self.blocksize).await?;
        with_async_drop!(blobstore, {
            check_blobstore(&blobstore, self.root_blob, &NoReferencedBlobs).await
        })
    }
}
