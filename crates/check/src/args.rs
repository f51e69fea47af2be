use byte_unit::Byte;
use clap::{builder::PossibleValuesParser, Parser};
use std::path::PathBuf;

use cryblocks_blobstore::BlobId;
use cryblocks_crypto::symmetric::ALL_CIPHERS;

/// Check an encrypted block store for unreadable, missing and orphaned blocks.
#[derive(Parser, Debug)]
#[command(name = "cryblocks-check", version)]
pub struct CheckArgs {
    /// Directory containing the block files
    pub basedir: PathBuf,

    /// Cipher the blocks are encrypted with
    #[arg(long, default_value = "xchacha20-poly1305", value_parser = PossibleValuesParser::new(ALL_CIPHERS))]
    pub cipher: String,

    /// Encryption key, hex encoded
    #[arg(long)]
    pub key: String,

    /// Size of the block files, e.g. "32KiB"
    #[arg(long, default_value = "32KiB", value_parser = parse_byte_size)]
    pub blocksize: Byte,

    /// Id of the blob all other blobs are reachable from, hex encoded
    #[arg(long, value_parser = parse_blob_id)]
    pub root_blob: BlobId,
}

fn parse_byte_size(value: &str) -> Result<Byte, String> {
    Byte::parse_str(value, true).map_err(|err| err.to_string())
}

fn parse_blob_id(value: &str) -> Result<BlobId, String> {
    BlobId::from_hex(value).map_err(|err| format!("Invalid blob id: {err}"))
}
