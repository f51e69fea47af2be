use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use cryblocks_blobstore::BlobId;
use cryblocks_blockstore::BlockId;

/// Who points at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeReference {
    /// The node is the root of the blob the check started at.
    RootBlob,

    /// The node is a child of an inner node.
    ParentNode { parent_id: BlockId },

    /// The node is the root of a blob that another blob refers to, e.g. through a directory entry.
    ReferencedByBlob { referencing_blob: BlobId },
}

impl Display for NodeReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootBlob => write!(f, "root blob"),
            Self::ParentNode { parent_id } => write!(f, "parent node {parent_id}"),
            Self::ReferencedByBlob { referencing_blob } => write!(f, "blob {referencing_blob}"),
        }
    }
}

fn display_references(references: &BTreeSet<NodeReference>) -> String {
    references
        .iter()
        .map(|reference| reference.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A [CorruptedError] is an error we found in the store when analyzing it
#[derive(Debug, Error, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum CorruptedError {
    #[error("Node {node_id} exists but can't be loaded: {error}")]
    NodeUnreadable { node_id: BlockId, error: String },

    #[error("Node {node_id} is missing. Referenced by: {}", display_references(.referenced_by))]
    NodeMissing {
        node_id: BlockId,
        referenced_by: BTreeSet<NodeReference>,
    },

    #[error("Node {node_id} exists but nothing references it")]
    NodeUnreferenced { node_id: BlockId },

    #[error("Node {node_id} is referenced multiple times. Referenced by: {}", display_references(.referenced_by))]
    NodeReferencedMultipleTimes {
        node_id: BlockId,
        referenced_by: BTreeSet<NodeReference>,
    },
}

impl CorruptedError {
    pub fn node_id(&self) -> &BlockId {
        match self {
            Self::NodeUnreadable { node_id, .. }
            | Self::NodeMissing { node_id, .. }
            | Self::NodeUnreferenced { node_id }
            | Self::NodeReferencedMultipleTimes { node_id, .. } => node_id,
        }
    }
}

/// A [CheckError] is an error in the analysis itself. It doesn't necessarily mean that the store is corrupted.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("The store was modified while the check was running. Please make sure nothing else uses the store for the duration of the check.\n Details: {msg}")]
    StoreModified { msg: String },
}
