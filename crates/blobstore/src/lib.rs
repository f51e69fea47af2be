//! Variable-length blobs stored as balanced trees of fixed-size blocks.
//!
//! A blob is a tree of nodes. Leaves hold the bytes, inner nodes hold the ids of their
//! children, and every node is one block in the underlying [cryblocks_blockstore::BlockStore].
//! All leaves are at the same depth and only the rightmost path of the tree may be non-full.

#![forbid(unsafe_code)]

mod blob_id;
pub use blob_id::BlobId;

mod interface;
pub use interface::{Blob, BlobStore, BLOBID_LEN};

mod on_blocks;
pub use on_blocks::{
    BlobOnBlocks, BlobStoreOnBlocks, CapacityExceededError, CorruptLayoutError, DataInnerNode,
    DataLeafNode, DataNode, DataNodeStore, DataTree, DataTreeStore, LoadNodeError, NodeLayout,
    NodeNotFoundError, OutOfRangeError, MAX_DEPTH, MIN_BLOCK_SIZE_BYTES,
};

pub use cryblocks_blockstore::RemoveResult;

#[cfg(test)]
mod tests;

// This is needed by rstest_reuse, otherwise it can't find its macros
#[cfg(test)]
use rstest_reuse;
