use binary_layout::Field;
use std::num::{NonZeroU32, NonZeroU8};

use super::super::{
    errors::{CapacityExceededError, CorruptLayoutError},
    layout::{node, NodeLayout, FORMAT_VERSION_HEADER, MAX_DEPTH},
    node_block::NodeBlock,
};
use super::DataNode;
use cryblocks_blockstore::{BlockId, BlockStore, BLOCKID_LEN};
use cryblocks_utils::data::{Data, ZeroedData};

#[derive(Debug)]
pub struct DataInnerNode {
    block: NodeBlock,
}

impl DataInnerNode {
    /// Expects that [DataNode::parse] already checked the block size and format version.
    pub(super) fn new(block: NodeBlock, layout: &NodeLayout) -> Result<Self, CorruptLayoutError> {
        let view = node::View::new(block.data());
        let depth = view.depth().read();
        assert_ne!(0, depth, "Depth 0 nodes are leaves");
        let corrupt = |reason: String| CorruptLayoutError::new(*block.block_id(), reason);
        if depth > MAX_DEPTH {
            return Err(corrupt(format!(
                "Inner node has depth {} but the maximum is {}",
                depth, MAX_DEPTH
            )));
        }
        let num_children = view.size().read();
        if num_children == 0 {
            return Err(corrupt("Inner node has no children".to_string()));
        }
        if num_children > layout.max_children_per_inner_node() {
            return Err(corrupt(format!(
                "Inner node claims to have {} children but can have at most {}",
                num_children,
                layout.max_children_per_inner_node()
            )));
        }
        Ok(Self { block })
    }

    pub fn depth(&self) -> NonZeroU8 {
        let depth = node::View::new(self.block.data()).depth().read();
        NonZeroU8::new(depth).expect("Invariant violated: inner node with depth 0")
    }

    pub fn block_id(&self) -> &BlockId {
        self.block.block_id()
    }

    pub(super) fn raw_blockdata(&self) -> &Data {
        self.block.data()
    }

    pub(super) fn into_block(self) -> NodeBlock {
        self.block
    }

    pub fn is_dirty(&self) -> bool {
        self.block.is_dirty()
    }

    pub(crate) async fn flush<B: BlockStore>(&mut self, block_store: &B) -> anyhow::Result<()> {
        self.block.flush(block_store).await
    }

    pub fn num_children(&self) -> NonZeroU32 {
        let num_children = node::View::new(self.block.data()).size().read();
        NonZeroU32::new(num_children).expect("Invariant violated: inner node without children")
    }

    pub fn max_children(&self) -> u32 {
        ((self.block.data().len() - node::data::OFFSET) / BLOCKID_LEN) as u32
    }

    /// Child ids in order, leftmost first.
    pub fn children(&self) -> impl ExactSizeIterator<Item = BlockId> + '_ {
        let num_children = self.num_children().get() as usize;
        self.block.data()[node::data::OFFSET..]
            .chunks_exact(BLOCKID_LEN)
            .take(num_children)
            .map(|entry| {
                BlockId::from_array(entry.try_into().expect("chunks_exact yields BLOCKID_LEN bytes"))
            })
    }

    pub fn last_child(&self) -> BlockId {
        let index = self.num_children().get() as usize - 1;
        let begin = node::data::OFFSET + index * BLOCKID_LEN;
        let entry = &self.block.data()[begin..begin + BLOCKID_LEN];
        BlockId::from_array(entry.try_into().expect("Slice has BLOCKID_LEN bytes"))
    }

    pub fn add_child(&mut self, child: &DataNode) -> anyhow::Result<()> {
        let depth = self.depth().get();
        anyhow::ensure!(
            child.depth() + 1 == depth,
            "Tried to add a child of depth {} to an inner node of depth {}",
            child.depth(),
            depth
        );
        let num_children = self.num_children().get();
        let max_children = self.max_children();
        if num_children >= max_children {
            return Err(CapacityExceededError::TooManyChildren {
                num: num_children as usize + 1,
                max: max_children,
            }
            .into());
        }
        let mut view = node::View::new(self.block.data_mut());
        let begin = num_children as usize * BLOCKID_LEN;
        view.data_mut()[begin..begin + BLOCKID_LEN].copy_from_slice(child.block_id().data());
        view.size_mut().write(num_children + 1);
        Ok(())
    }

    /// Cut off the rightmost children, zeroing their entries. The removed subtrees aren't touched.
    pub fn shrink_num_children(&mut self, new_num_children: NonZeroU32) -> anyhow::Result<()> {
        let old_num_children = self.num_children().get();
        anyhow::ensure!(
            new_num_children.get() <= old_num_children,
            "Tried to shrink an inner node with {} children to {} children",
            old_num_children,
            new_num_children,
        );
        if new_num_children.get() == old_num_children {
            return Ok(());
        }
        let mut view = node::View::new(self.block.data_mut());
        let free_begin = new_num_children.get() as usize * BLOCKID_LEN;
        let free_end = old_num_children as usize * BLOCKID_LEN;
        view.data_mut()[free_begin..free_end].fill(0);
        view.size_mut().write(new_num_children.get());
        Ok(())
    }

    pub fn upcast(self) -> DataNode {
        DataNode::Inner(self)
    }
}

pub(in super::super) fn serialize_inner_node(
    depth: u8,
    children: &[BlockId],
    layout: &NodeLayout,
) -> Result<Data, CapacityExceededError> {
    check_inner_node_capacity(children, layout)?;
    let block_data = ZeroedData::new(layout.block_size_bytes as usize);
    Ok(initialize_inner_node(depth, children, block_data))
}

pub(super) fn check_inner_node_capacity(
    children: &[BlockId],
    layout: &NodeLayout,
) -> Result<(), CapacityExceededError> {
    if children.is_empty() {
        return Err(CapacityExceededError::NoChildren);
    }
    if children.len() > layout.max_children_per_inner_node() as usize {
        return Err(CapacityExceededError::TooManyChildren {
            num: children.len(),
            max: layout.max_children_per_inner_node(),
        });
    }
    Ok(())
}

/// Writes header and children into an all-zero buffer. Capacity must have been checked already.
pub(super) fn initialize_inner_node<D>(depth: u8, children: &[BlockId], dest: ZeroedData<D>) -> D
where
    D: AsRef<[u8]> + AsMut<[u8]>,
{
    assert!(
        (1..=MAX_DEPTH).contains(&depth),
        "Inner nodes must have a depth between 1 and {} but got {}",
        MAX_DEPTH,
        depth
    );
    let mut view = node::View::new(dest.into_inner());
    view.format_version_header_mut()
        .write(FORMAT_VERSION_HEADER);
    view.unused_mut().write(0);
    view.depth_mut().write(depth);
    view.size_mut().write(children.len() as u32);
    let entries = view.data_mut();
    for (index, child) in children.iter().enumerate() {
        entries[index * BLOCKID_LEN..(index + 1) * BLOCKID_LEN].copy_from_slice(child.data());
    }
    view.into_storage()
}
