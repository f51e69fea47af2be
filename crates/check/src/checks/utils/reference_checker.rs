use std::collections::{hash_map::Entry, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// Remembers for each node id whether the node itself was seen and who referenced it.
/// Comparing the two afterwards finds missing nodes, unreferenced nodes and nodes with multiple parents.
pub struct ReferenceChecker<NodeId, ReferenceInfo>
where
    NodeId: Debug + Hash + PartialEq + Eq,
{
    // `true` if the node was seen
    nodes: HashMap<NodeId, (bool, Vec<ReferenceInfo>)>,
}

impl<NodeId, ReferenceInfo> ReferenceChecker<NodeId, ReferenceInfo>
where
    NodeId: Debug + Hash + PartialEq + Eq,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Panics if the node was already seen. Callers must visit each existing node exactly once.
    pub fn mark_as_seen(&mut self, node_id: NodeId) {
        match self.nodes.entry(node_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().0 {
                    panic!(
                        "Node {node_id:?} was seen twice. Each node must only be visited once.",
                        node_id = entry.key()
                    );
                }
                entry.get_mut().0 = true;
            }
            Entry::Vacant(entry) => {
                entry.insert((true, vec![]));
            }
        }
    }

    pub fn mark_as_referenced(&mut self, node_id: NodeId, reference_info: ReferenceInfo) {
        match self.nodes.entry(node_id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().1.push(reference_info);
            }
            Entry::Vacant(entry) => {
                entry.insert((false, vec![reference_info]));
            }
        }
    }

    /// Every node id with whether it was seen and all references to it
    pub fn finalize(self) -> impl Iterator<Item = (NodeId, bool, Vec<ReferenceInfo>)> {
        self.nodes
            .into_iter()
            .map(|(node_id, (seen, references))| (node_id, seen, references))
    }
}
