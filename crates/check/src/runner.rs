use anyhow::{Context, Result};
use futures::stream::{StreamExt, TryStreamExt};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::checks::{CheckResult, CheckUnreferencedNodes, UnaccountedStats};
use crate::error::{CheckError, CorruptedError};
use crate::referenced_blobs::ReferencedBlobs;
use cryblocks_blobstore::{BlobId, BlobStore, BlobStoreOnBlocks};
use cryblocks_blockstore::{BlockId, BlockStore};

const NUM_PARALLEL_LOADS: usize = 16;
const PROGRESS_LOG_INTERVAL: u64 = 1000;

/// Checks every block in `blobstore` and reports nodes that are unreadable, missing, unreferenced
/// or referenced more than once. The store is only read, never changed.
///
/// Reachable blobs are found by starting at `root_blob` and following `referenced_blobs`.
/// Failures to load individual nodes are recorded and the check continues with the other nodes.
pub async fn check_blobstore<B: BlockStore>(
    blobstore: &BlobStoreOnBlocks<B>,
    root_blob: BlobId,
    referenced_blobs: &impl ReferencedBlobs<B>,
) -> Result<CheckResult> {
    let mut check = CheckUnreferencedNodes::new(root_blob);
    let mut unreadable_nodes = BTreeMap::new();

    _check_all_nodes(blobstore, &mut check, &mut unreadable_nodes).await?;
    _check_reachable_blobs(
        blobstore,
        root_blob,
        referenced_blobs,
        &mut check,
        &unreadable_nodes,
    )
    .await;

    let (reference_errors, unaccounted_blocks) = check.finalize();
    let unaccounted_stats =
        _unaccounted_stats(blobstore, &unaccounted_blocks, &unreadable_nodes).await;
    log::info!(
        "Unaccounted blocks: {}. {} leaves and {} inner nodes",
        unaccounted_blocks.len(),
        unaccounted_stats.num_leaves,
        unaccounted_stats.num_inner_nodes,
    );

    let errors = unreadable_nodes
        .into_iter()
        .map(|(node_id, error)| CorruptedError::NodeUnreadable { node_id, error })
        .chain(reference_errors)
        .collect();
    Ok(CheckResult::new(
        errors,
        unaccounted_blocks,
        unaccounted_stats,
    ))
}

async fn _check_all_nodes<B: BlockStore>(
    blobstore: &BlobStoreOnBlocks<B>,
    check: &mut CheckUnreferencedNodes,
    unreadable_nodes: &mut BTreeMap<BlockId, String>,
) -> Result<()> {
    let tree_store = blobstore.tree_store();
    let all_nodes: Vec<BlockId> = tree_store
        .all_nodes()
        .await?
        .try_collect()
        .await
        .context("Failed to list the blocks in the store")?;
    let num_nodes = all_nodes.len();
    log::info!("There are {num_nodes} blocks");

    let mut loaded_nodes = futures::stream::iter(all_nodes)
        .map(|node_id| async move { (node_id, tree_store.load_node(&node_id).await) })
        .buffer_unordered(NUM_PARALLEL_LOADS);
    let mut num_processed = 0;
    while let Some((node_id, node)) = loaded_nodes.next().await {
        match node {
            Ok(Some(node)) => {
                check.process_existing_node(node_id);
                check.process_node_children(&node);
            }
            Ok(None) => {
                return Err(CheckError::StoreModified {
                    msg: format!("Node {node_id} was listed but then couldn't be found"),
                }
                .into());
            }
            Err(error) => {
                log::warn!("Node {node_id} is unreadable: {error:#}");
                check.process_existing_node(node_id);
                unreadable_nodes.insert(node_id, format!("{error:#}"));
            }
        }
        num_processed += 1;
        if num_processed % PROGRESS_LOG_INTERVAL == 0 {
            log::info!("Checked {num_processed}/{num_nodes} blocks");
        }
    }
    Ok(())
}

async fn _check_reachable_blobs<B: BlockStore>(
    blobstore: &BlobStoreOnBlocks<B>,
    root_blob: BlobId,
    referenced_blobs: &impl ReferencedBlobs<B>,
    check: &mut CheckUnreferencedNodes,
    unreadable_nodes: &BTreeMap<BlockId, String>,
) {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root_blob]);
    while let Some(blob_id) = queue.pop_front() {
        if !visited.insert(blob_id) || unreadable_nodes.contains_key(blob_id.to_root_block_id()) {
            continue;
        }
        let mut blob = match blobstore.load(&blob_id).await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                // Already reported as missing because it is referenced
                continue;
            }
            Err(error) => {
                log::warn!("Blob {blob_id} couldn't be loaded: {error:#}");
                continue;
            }
        };
        match referenced_blobs.referenced_blobs(&mut blob).await {
            Ok(references) => {
                for referenced_blob in references {
                    check.process_blob_reference(blob_id, referenced_blob);
                    queue.push_back(referenced_blob);
                }
            }
            Err(error) => {
                // The nodes causing this are reported by the node check
                log::warn!("Failed to read the blobs referenced by blob {blob_id}: {error:#}");
            }
        }
    }
}

async fn _unaccounted_stats<B: BlockStore>(
    blobstore: &BlobStoreOnBlocks<B>,
    unaccounted_blocks: &BTreeSet<BlockId>,
    unreadable_nodes: &BTreeMap<BlockId, String>,
) -> UnaccountedStats {
    let mut stats = UnaccountedStats::default();
    for block_id in unaccounted_blocks {
        if unreadable_nodes.contains_key(block_id) {
            stats.num_unreadable += 1;
            continue;
        }
        match blobstore.load_block_depth(block_id).await {
            Ok(Some(0)) => stats.num_leaves += 1,
            Ok(Some(_)) => stats.num_inner_nodes += 1,
            Ok(None) | Err(_) => stats.num_unreadable += 1,
        }
    }
    stats
}
