mod data_inner_node;
mod data_leaf_node;
#[allow(clippy::module_inception)]
mod data_node;

pub use data_inner_node::DataInnerNode;
pub(super) use data_inner_node::serialize_inner_node;
pub(super) use data_leaf_node::serialize_leaf_node;
pub use data_leaf_node::DataLeafNode;
pub use data_node::DataNode;
