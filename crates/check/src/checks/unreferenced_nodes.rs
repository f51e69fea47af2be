use std::collections::BTreeSet;

use super::utils::ReferenceChecker;
use crate::error::{CorruptedError, NodeReference};
use cryblocks_blobstore::{BlobId, DataNode};
use cryblocks_blockstore::BlockId;

/// Check that each existing node is referenced exactly once and each referenced node exists.
///
/// Every existing node is marked as **seen** and every child of an inner node as **referenced** by its parent.
/// Blob roots are referenced by the blob pointing at them. Unreferenced subtrees are reported by their root only,
/// since the nodes below it are referenced by their parents.
pub struct CheckUnreferencedNodes {
    checker: ReferenceChecker<BlockId, NodeReference>,
}

impl CheckUnreferencedNodes {
    pub fn new(root_blob_id: BlobId) -> Self {
        let mut checker = ReferenceChecker::new();
        checker.mark_as_referenced(*root_blob_id.to_root_block_id(), NodeReference::RootBlob);
        Self { checker }
    }

    /// Call once for each node that exists in the store, whether it could be loaded or not.
    pub fn process_existing_node(&mut self, node_id: BlockId) {
        self.checker.mark_as_seen(node_id);
    }

    pub fn process_node_children(&mut self, node: &DataNode) {
        match node {
            DataNode::Inner(inner) => {
                let parent_id = *inner.block_id();
                for child in inner.children() {
                    self.checker
                        .mark_as_referenced(child, NodeReference::ParentNode { parent_id });
                }
            }
            DataNode::Leaf(_) => {
                // A leaf node doesn't reference other nodes
            }
        }
    }

    pub fn process_blob_reference(&mut self, referencing_blob: BlobId, referenced_blob: BlobId) {
        self.checker.mark_as_referenced(
            *referenced_blob.to_root_block_id(),
            NodeReference::ReferencedByBlob { referencing_blob },
        );
    }

    /// Returns the errors found and the ids of the unreferenced nodes among them.
    pub fn finalize(self) -> (Vec<CorruptedError>, BTreeSet<BlockId>) {
        let mut errors = Vec::new();
        let mut unreferenced = BTreeSet::new();
        for (node_id, seen, references) in self.checker.finalize() {
            let referenced_by: BTreeSet<NodeReference> = references.iter().copied().collect();
            match (seen, references.len()) {
                (true, 0) => {
                    unreferenced.insert(node_id);
                    errors.push(CorruptedError::NodeUnreferenced { node_id });
                }
                (true, 1) => {
                    // Everything is fine
                }
                (true, _) => {
                    errors.push(CorruptedError::NodeReferencedMultipleTimes {
                        node_id,
                        referenced_by,
                    });
                }
                (false, 0) => {
                    panic!("Node {node_id:?} was neither seen nor referenced but still recorded");
                }
                (false, _) => {
                    errors.push(CorruptedError::NodeMissing {
                        node_id,
                        referenced_by,
                    });
                }
            }
        }
        (errors, unreferenced)
    }
}
