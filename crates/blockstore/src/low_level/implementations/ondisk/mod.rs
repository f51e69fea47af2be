use anyhow::{anyhow, bail, Context, Error, Result};
use async_trait::async_trait;
use byte_unit::Byte;
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use std::fmt::{self, Debug};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::DirEntry;
use tokio_stream::wrappers::ReadDirStream;

use crate::low_level::{BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter};
use crate::{
    BlockId, InvalidBlockSizeError, Overhead, RemoveResult, TryCreateResult, BLOCKID_LEN,
};
use cryblocks_utils::{
    async_drop::{AsyncDrop, AsyncDropGuard},
    data::Data,
};

const FORMAT_VERSION_HEADER_PREFIX: &[u8] = b"cryblocks;block;";
const FORMAT_VERSION_HEADER: &[u8] = b"cryblocks;block;0\0";

// Blocks are spread over subdirectories named after the first hex characters of their id
const PREFIX_LEN: usize = 3;
const NONPREFIX_LEN: usize = 2 * BLOCKID_LEN - PREFIX_LEN;

/// Stores each block as a file `basedir/<first 3 hex chars>/<remaining 29 hex chars>`.
pub struct OnDiskBlockStore {
    basedir: PathBuf,
}

impl OnDiskBlockStore {
    pub fn new(basedir: PathBuf) -> AsyncDropGuard<Self> {
        AsyncDropGuard::new(Self { basedir })
    }

    fn _block_path(&self, block_id: &BlockId) -> PathBuf {
        let block_id = block_id.to_hex_upper();
        self.basedir
            .join(&block_id[..PREFIX_LEN])
            .join(&block_id[PREFIX_LEN..])
    }
}

#[async_trait]
impl BlockStoreReader for OnDiskBlockStore {
    async fn exists(&self, id: &BlockId) -> Result<bool> {
        _path_exists(&self._block_path(id)).await
    }

    async fn load(&self, id: &BlockId) -> Result<Option<Data>> {
        let path = self._block_path(id);
        match tokio::fs::read(&path).await {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to read block file at {}", path.display())),
            Ok(file_content) => {
                let block_content = _check_and_remove_header(file_content.into())
                    .with_context(|| format!("Failed to parse block file at {}", path.display()))?;
                Ok(Some(block_content))
            }
        }
    }

    async fn num_blocks(&self) -> Result<u64> {
        _all_block_files(self.basedir.clone())
            .await?
            .try_fold(0, |acc, _blockfile| future::ready(Ok(acc + 1)))
            .await
    }

    fn block_size_from_physical_block_size(
        &self,
        block_size: Byte,
    ) -> Result<Byte, InvalidBlockSizeError> {
        Overhead::new(Byte::from_u64(FORMAT_VERSION_HEADER.len() as u64))
            .usable_block_size_from_physical_block_size(block_size)
    }

    async fn all_blocks(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        Ok(_all_block_files(self.basedir.clone())
            .await?
            .and_then(|entry| future::ready(_blockid_from_filepath(&entry.path())))
            .boxed())
    }
}

#[async_trait]
impl BlockStoreDeleter for OnDiskBlockStore {
    async fn remove(&self, id: &BlockId) -> Result<RemoveResult> {
        let path = self._block_path(id);
        match tokio::fs::remove_file(&path).await {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Ok(RemoveResult::NotRemovedBecauseItDoesntExist)
            }
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove block file at {}", path.display())),
            Ok(()) => {
                // Leave the (possibly empty) prefix directory in place. Another block will likely reuse it.
                Ok(RemoveResult::SuccessfullyRemoved)
            }
        }
    }
}

#[async_trait]
impl BlockStoreWriter for OnDiskBlockStore {
    async fn try_create(&self, id: &BlockId, data: &[u8]) -> Result<TryCreateResult> {
        let path = self._block_path(id);
        if _path_exists(&path).await? {
            Ok(TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists)
        } else {
            _store(&path, data).await?;
            Ok(TryCreateResult::SuccessfullyCreated)
        }
    }

    async fn store(&self, id: &BlockId, data: &[u8]) -> Result<()> {
        _store(&self._block_path(id), data).await
    }
}

impl Debug for OnDiskBlockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OnDiskBlockStore({})", self.basedir.display())
    }
}

#[async_trait]
impl AsyncDrop for OnDiskBlockStore {
    type Error = anyhow::Error;
    async fn async_drop_impl(&mut self) -> Result<()> {
        Ok(())
    }
}

impl BlockStore for OnDiskBlockStore {}

async fn _all_block_files(basedir: PathBuf) -> Result<impl Stream<Item = Result<DirEntry>> + Send> {
    let subdirs = ReadDirStream::new(
        tokio::fs::read_dir(&basedir)
            .await
            .with_context(|| format!("Failed to read {}", basedir.display()))?,
    )
    .map_err(Error::from);
    Ok(subdirs
        .try_filter_map(|subdir| async move {
            if subdir.metadata().await?.is_dir() && _is_blockid_part(&subdir, PREFIX_LEN)? {
                let entries = ReadDirStream::new(tokio::fs::read_dir(subdir.path()).await?)
                    .map_err(Error::from);
                Ok(Some(entries))
            } else {
                Ok(None)
            }
        })
        .try_flatten()
        .try_filter_map(|blockfile| async move {
            if _is_blockid_part(&blockfile, NONPREFIX_LEN)? {
                Ok(Some(blockfile))
            } else {
                Ok(None)
            }
        }))
}

async fn _path_exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn _store(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("Block file path {} has no parent", path.display()))?;
    match tokio::fs::create_dir(parent).await {
        Ok(()) => (),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => (),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to create block directory {}", parent.display())
            })
        }
    }
    let mut file_content = Vec::with_capacity(FORMAT_VERSION_HEADER.len() + data.len());
    file_content.extend_from_slice(FORMAT_VERSION_HEADER);
    file_content.extend_from_slice(data);
    tokio::fs::write(path, file_content)
        .await
        .with_context(|| format!("Failed to write block file at {}", path.display()))
}

fn _check_and_remove_header(mut data: Data) -> Result<Data> {
    if !data.starts_with(FORMAT_VERSION_HEADER) {
        if data.starts_with(FORMAT_VERSION_HEADER_PREFIX) {
            bail!("This block has an unsupported format version. Maybe it was created with a newer version?");
        } else {
            bail!("This is not a valid block file");
        }
    }
    data.shrink_to_subregion(FORMAT_VERSION_HEADER.len()..);
    Ok(data)
}

fn _is_blockid_part(entry: &DirEntry, expected_len: usize) -> Result<bool> {
    let name = entry.file_name();
    let name = name
        .to_str()
        .ok_or_else(|| anyhow!("Invalid UTF-8 in path {}", entry.path().display()))?;
    Ok(name.len() == expected_len && name.chars().all(|c| matches!(c, '0'..='9' | 'A'..='F')))
}

fn _blockid_from_filepath(path: &Path) -> Result<BlockId> {
    fn file_name<'p>(p: Option<&'p Path>, full_path: &Path) -> Result<&'p str> {
        p.and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("Invalid block file path {}", full_path.display()))
    }
    let prefix = file_name(path.parent(), path)?;
    let nonprefix = file_name(Some(path), path)?;
    BlockId::from_hex(&format!("{prefix}{nonprefix}"))
        .with_context(|| format!("Block file path {} can't be parsed as block id", path.display()))
}
