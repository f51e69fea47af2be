use anyhow::Result;

use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::data::Data;

/// Raw bytes of a node together with a flag telling whether they changed since they were last stored.
/// Changes only reach the block store through [NodeBlock::flush].
#[derive(Debug)]
pub struct NodeBlock {
    block_id: BlockId,
    data: Data,
    dirty: bool,
}

impl NodeBlock {
    /// For data that is identical to what's currently in the block store.
    pub fn new_clean(block_id: BlockId, data: Data) -> Self {
        Self {
            block_id,
            data,
            dirty: false,
        }
    }

    pub fn block_id(&self) -> &BlockId {
        &self.block_id
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Data {
        self.dirty = true;
        &mut self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub async fn flush<B: BlockStore>(&mut self, block_store: &B) -> Result<()> {
        if self.dirty {
            block_store.store(&self.block_id, &self.data).await?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Drop the in-memory changes, e.g. because the block is about to be removed.
    pub fn discard(mut self) -> BlockId {
        self.dirty = false;
        self.block_id
    }
}

impl Drop for NodeBlock {
    fn drop(&mut self) {
        if self.dirty && !std::thread::panicking() {
            log::warn!(
                "Node {} was dropped with changes that were never flushed",
                self.block_id
            );
        }
    }
}
