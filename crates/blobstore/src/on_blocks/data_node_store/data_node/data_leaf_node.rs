use binary_layout::Field;

use super::super::{
    errors::{CapacityExceededError, CorruptLayoutError},
    layout::{node, NodeLayout, FORMAT_VERSION_HEADER},
    node_block::NodeBlock,
};
use super::DataNode;
use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::data::Data;

#[derive(Debug)]
pub struct DataLeafNode {
    block: NodeBlock,
}

impl DataLeafNode {
    /// Expects that [DataNode::parse] already checked the block size, format version and depth.
    pub(super) fn new(block: NodeBlock, layout: &NodeLayout) -> Result<Self, CorruptLayoutError> {
        let size = node::View::new(block.data()).size().read();
        if size > layout.max_bytes_per_leaf() {
            return Err(CorruptLayoutError::new(
                *block.block_id(),
                format!(
                    "Leaf claims to store {} bytes but can store at most {}",
                    size,
                    layout.max_bytes_per_leaf()
                ),
            ));
        }
        Ok(Self { block })
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

    pub fn num_bytes(&self) -> u32 {
        node::View::new(self.block.data()).size().read()
    }

    pub fn max_bytes_per_leaf(&self) -> u32 {
        (self.block.data().len() - node::data::OFFSET) as u32
    }

    /// Shrinking zeroes out the bytes that are cut off, so stale data doesn't survive in the block.
    pub fn resize(&mut self, new_num_bytes: u32) {
        assert!(
            new_num_bytes <= self.max_bytes_per_leaf(),
            "Tried to resize leaf to {} bytes but it can hold at most {}",
            new_num_bytes,
            self.max_bytes_per_leaf()
        );
        let old_num_bytes = self.num_bytes();
        if new_num_bytes == old_num_bytes {
            return;
        }
        let mut view = node::View::new(self.block.data_mut());
        if new_num_bytes < old_num_bytes {
            view.data_mut()[new_num_bytes as usize..old_num_bytes as usize].fill(0);
        }
        view.size_mut().write(new_num_bytes);
    }

    pub fn data(&self) -> &[u8] {
        let num_bytes = self.num_bytes() as usize;
        &self.block.data()[node::data::OFFSET..node::data::OFFSET + num_bytes]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        let num_bytes = self.num_bytes() as usize;
        &mut self.block.data_mut()[node::data::OFFSET..node::data::OFFSET + num_bytes]
    }

    pub fn upcast(self) -> DataNode {
        DataNode::Leaf(self)
    }
}

/// Build the full block for a leaf holding `data`. The bytes after `data` stay zero.
pub(in super::super) fn serialize_leaf_node(
    data: &[u8],
    layout: &NodeLayout,
) -> Result<Data, CapacityExceededError> {
    if data.len() > layout.max_bytes_per_leaf() as usize {
        return Err(CapacityExceededError::LeafTooLarge {
            num_bytes: data.len(),
            max: layout.max_bytes_per_leaf(),
        });
    }
    let mut block_data = Data::from(vec![0; layout.block_size_bytes as usize]);
    let mut view = node::View::new(&mut block_data);
    view.format_version_header_mut()
        .write(FORMAT_VERSION_HEADER);
    view.unused_mut().write(0);
    view.depth_mut().write(0);
    view.size_mut().write(data.len() as u32);
    view.data_mut()[..data.len()].copy_from_slice(data);
    Ok(block_data)
}
