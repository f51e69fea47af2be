use thiserror::Error;

use cryblocks_blockstore::BlockId;

/// A block was decrypted successfully but doesn't contain a valid node.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Node {block_id} has an invalid layout: {reason}")]
pub struct CorruptLayoutError {
    pub block_id: BlockId,
    pub reason: String,
}

impl CorruptLayoutError {
    pub(super) fn new(block_id: BlockId, reason: impl Into<String>) -> Self {
        Self {
            block_id,
            reason: reason.into(),
        }
    }
}

/// A caller asked for a node that doesn't fit into the fixed node layout.
/// Nothing was written when this is returned.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CapacityExceededError {
    #[error("Inner nodes can have at most {max} children but tried to store {num}")]
    TooManyChildren { num: usize, max: u32 },

    #[error("Inner nodes must have at least one child")]
    NoChildren,

    #[error("Leaves can store at most {max} bytes but tried to store {num_bytes}")]
    LeafTooLarge { num_bytes: usize, max: u32 },

    #[error("Trees can be at most {max} levels deep but would need at least depth {depth}")]
    TreeTooDeep { depth: u8, max: u8 },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Node {block_id} not found")]
pub struct NodeNotFoundError {
    pub block_id: BlockId,
}
