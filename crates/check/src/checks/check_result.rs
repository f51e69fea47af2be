use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use crate::CorruptedError;
use cryblocks_blockstore::BlockId;

/// What kind of nodes the unaccounted blocks are.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnaccountedStats {
    pub num_leaves: u64,
    pub num_inner_nodes: u64,
    pub num_unreadable: u64,
}

#[derive(Debug)]
pub struct CheckResult {
    errors: Vec<CorruptedError>,
    unaccounted_blocks: BTreeSet<BlockId>,
    unaccounted_stats: UnaccountedStats,
}

impl CheckResult {
    pub fn new(
        mut errors: Vec<CorruptedError>,
        unaccounted_blocks: BTreeSet<BlockId>,
        unaccounted_stats: UnaccountedStats,
    ) -> Self {
        errors.sort();
        Self {
            errors,
            unaccounted_blocks,
            unaccounted_stats,
        }
    }

    /// All findings, sorted
    pub fn errors(&self) -> &[CorruptedError] {
        &self.errors
    }

    /// Blocks that exist in the store but aren't reachable from any tree or blob reference
    pub fn unaccounted_blocks(&self) -> &BTreeSet<BlockId> {
        &self.unaccounted_blocks
    }

    pub fn unaccounted_stats(&self) -> UnaccountedStats {
        self.unaccounted_stats
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<CorruptedError> {
        self.errors
    }
}

impl Display for CheckResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return writeln!(f, "No errors found");
        }
        writeln!(f, "Found {} errors:", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "- {error}")?;
        }
        writeln!(
            f,
            "Unaccounted blocks: {}",
            self.unaccounted_blocks.len()
        )?;
        writeln!(
            f,
            "{} leaves and {} inner nodes ({} unreadable)",
            self.unaccounted_stats.num_leaves,
            self.unaccounted_stats.num_inner_nodes,
            self.unaccounted_stats.num_unreadable,
        )
    }
}
