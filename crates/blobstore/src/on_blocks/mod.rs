mod data_node_store;
mod data_tree_store;

mod blob_on_blocks;
mod blobstore_on_blocks;

pub use blob_on_blocks::BlobOnBlocks;
pub use blobstore_on_blocks::BlobStoreOnBlocks;
pub use data_node_store::{
    CapacityExceededError, CorruptLayoutError, DataInnerNode, DataLeafNode, DataNode,
    DataNodeStore, NodeLayout, NodeNotFoundError, MAX_DEPTH, MIN_BLOCK_SIZE_BYTES,
};
pub use data_tree_store::{DataTree, DataTreeStore, LoadNodeError, OutOfRangeError};
