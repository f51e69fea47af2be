use anyhow::{anyhow, Result};
use binary_layout::{binary_layout, Field};
use std::num::NonZeroU64;

use cryblocks_blockstore::BLOCKID_LEN;

pub const FORMAT_VERSION_HEADER: u16 = 0;

/// Deepest tree we're willing to load. With the minimal block size, this still allows for 1024 leaves.
pub const MAX_DEPTH: u8 = 10;

binary_layout!(node, LittleEndian, {
    format_version_header: u16,

    // Padding, always zero.
    unused: u8,

    // 0 for leaves, parents are one deeper than their children.
    depth: u8,

    // Number of payload bytes for leaves, number of children for inner nodes.
    size: u32,

    // Leaves: payload bytes. Inner nodes: densely packed child block ids.
    data: [u8],
});

/// Header plus space for two children. Anything smaller can't form a tree.
pub const MIN_BLOCK_SIZE_BYTES: u32 = (node::data::OFFSET + 2 * BLOCKID_LEN) as u32;

/// Capacities derived from the usable block size. Fixed for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    pub block_size_bytes: u32,
}

impl NodeLayout {
    pub const fn header_len() -> usize {
        node::data::OFFSET
    }

    pub const fn max_bytes_per_leaf(&self) -> u32 {
        self.block_size_bytes - node::data::OFFSET as u32
    }

    pub const fn max_children_per_inner_node(&self) -> u32 {
        self.max_bytes_per_leaf() / BLOCKID_LEN as u32
    }

    /// How many leaves a full subtree with a root of the given depth has.
    pub fn num_leaves_per_full_subtree(&self, depth: u8) -> Result<NonZeroU64> {
        let max_children = u64::from(self.max_children_per_inner_node());
        let num_leaves = max_children.checked_pow(u32::from(depth)).ok_or_else(|| {
            anyhow!(
                "Overflow computing number of leaves in a full subtree: {}^{}",
                max_children,
                depth,
            )
        })?;
        Ok(NonZeroU64::new(num_leaves).expect("A nonzero number to any power can't be zero"))
    }

    /// How many bytes a full subtree with a root of the given depth holds.
    pub fn num_bytes_per_full_subtree(&self, depth: u8) -> Result<u64> {
        let num_leaves = self.num_leaves_per_full_subtree(depth)?.get();
        num_leaves
            .checked_mul(u64::from(self.max_bytes_per_leaf()))
            .ok_or_else(|| {
                anyhow!(
                    "Overflow computing number of bytes in a full subtree of depth {}",
                    depth
                )
            })
    }
}
