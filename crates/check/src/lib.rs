//! Consistency check for block stores holding blob trees.
//!
//! Finds blocks that can't be decrypted or parsed, blocks that are referenced but missing,
//! and blocks that exist but aren't reachable from any blob (orphaned blocks).
//! The check only reads the store and never repairs anything.

#![forbid(unsafe_code)]

mod args;
pub use args::CheckArgs;

mod checks;
pub use checks::{CheckResult, UnaccountedStats};

mod cli;
pub use cli::run;

mod error;
pub use error::{CheckError, CorruptedError, NodeReference};

mod referenced_blobs;
pub use referenced_blobs::{NoReferencedBlobs, ReferencedBlobs};

mod runner;
pub use runner::check_blobstore;
