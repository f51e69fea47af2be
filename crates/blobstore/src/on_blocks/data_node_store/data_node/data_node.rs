use anyhow::Result;

use super::super::{
    errors::{CapacityExceededError, CorruptLayoutError},
    layout::{node, NodeLayout, FORMAT_VERSION_HEADER, MAX_DEPTH},
    node_block::NodeBlock,
};
use super::{
    data_inner_node::{self, DataInnerNode},
    data_leaf_node::DataLeafNode,
};
use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::data::{Data, ZeroedData};

/// A decoded node. Which variant it is follows from the depth stored in the node itself.
#[derive(Debug)]
pub enum DataNode {
    Inner(DataInnerNode),
    Leaf(DataLeafNode),
}

impl DataNode {
    pub(in super::super) fn parse(
        block_id: BlockId,
        data: Data,
        layout: &NodeLayout,
    ) -> Result<Self, CorruptLayoutError> {
        if data.len() != layout.block_size_bytes as usize {
            return Err(CorruptLayoutError::new(
                block_id,
                format!(
                    "Block has {} bytes but nodes have {} bytes",
                    data.len(),
                    layout.block_size_bytes
                ),
            ));
        }
        let view = node::View::new(&data);
        let format_version_header = view.format_version_header().read();
        if format_version_header != FORMAT_VERSION_HEADER {
            return Err(CorruptLayoutError::new(
                block_id,
                format!(
                    "Unsupported node format version {}, expected {}",
                    format_version_header, FORMAT_VERSION_HEADER
                ),
            ));
        }
        let is_leaf = view.depth().read() == 0;
        let block = NodeBlock::new_clean(block_id, data);
        if is_leaf {
            Ok(DataNode::Leaf(DataLeafNode::new(block, layout)?))
        } else {
            Ok(DataNode::Inner(DataInnerNode::new(block, layout)?))
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            Self::Leaf(_) => 0,
            Self::Inner(inner) => inner.depth().get(),
        }
    }

    pub fn block_id(&self) -> &BlockId {
        match self {
            Self::Leaf(leaf) => leaf.block_id(),
            Self::Inner(inner) => inner.block_id(),
        }
    }

    pub(crate) fn raw_blockdata(&self) -> &Data {
        match self {
            Self::Leaf(leaf) => leaf.raw_blockdata(),
            Self::Inner(inner) => inner.raw_blockdata(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.is_dirty(),
            Self::Inner(inner) => inner.is_dirty(),
        }
    }

    pub(crate) async fn flush<B: BlockStore>(&mut self, block_store: &B) -> anyhow::Result<()> {
        match self {
            Self::Leaf(leaf) => leaf.flush(block_store).await,
            Self::Inner(inner) => inner.flush(block_store).await,
        }
    }

    pub(in super::super) fn into_block(self) -> NodeBlock {
        match self {
            Self::Leaf(leaf) => leaf.into_block(),
            Self::Inner(inner) => inner.into_block(),
        }
    }

    /// Turns this node in place into an inner node whose only child is `first_child`.
    /// The block id stays the same, which is how the root keeps its id when the tree grows a level.
    /// Fails without touching any block if the new node would be deeper than [MAX_DEPTH].
    pub fn convert_to_new_inner_node(
        self,
        first_child: &DataNode,
        layout: &NodeLayout,
    ) -> Result<DataInnerNode> {
        let depth = first_child
            .depth()
            .checked_add(1)
            .filter(|depth| *depth <= MAX_DEPTH)
            .ok_or(CapacityExceededError::TreeTooDeep {
                depth: first_child.depth().saturating_add(1),
                max: MAX_DEPTH,
            })?;
        let mut block = self.into_block();
        let dest = ZeroedData::fill_with_zeroes(block.data_mut());
        data_inner_node::initialize_inner_node(depth, &[*first_child.block_id()], dest);
        Ok(DataInnerNode::new(block, layout)?)
    }

    /// Replaces the content of this node with the content of `source`, keeping this node's block id.
    pub fn overwrite_node_with(self, source: &DataNode, layout: &NodeLayout) -> DataNode {
        let mut block = self.into_block();
        let source_data = source.raw_blockdata();
        assert_eq!(
            source_data.len(),
            block.data().len(),
            "Source and destination nodes must come from the same node store"
        );
        block.data_mut().copy_from_slice(source_data);
        let is_leaf = source.depth() == 0;
        if is_leaf {
            DataNode::Leaf(DataLeafNode::new(block, layout).expect("Copied from a valid leaf"))
        } else {
            DataNode::Inner(
                DataInnerNode::new(block, layout).expect("Copied from a valid inner node"),
            )
        }
    }
}
