use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use divrem::DivCeil;
use futures::stream::BoxStream;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::num::{NonZeroU32, NonZeroU64};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use super::size_cache::SizeCache;
use super::traversal::{self, LeafHandle};
use crate::on_blocks::data_node_store::{
    DataInnerNode, DataNode, DataNodeStore, NodeLayout, NodeNotFoundError,
};
use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::{data::Data, stream::for_each_unordered};


/// A read tried to access bytes after the end of the tree.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Tried to read {len} bytes at offset {offset} but the tree only has {num_bytes} bytes")]
pub struct OutOfRangeError {
    pub offset: u64,
    pub len: u64,
    pub num_bytes: u64,
}

/// Handle to the byte content of one tree.
///
/// All methods take `&mut self`, so there is at most one operation in flight per handle.
/// Every mutating operation stores all nodes it changed before it returns, children
/// before their parents and the root last.
pub struct DataTree<'a, B: BlockStore> {
    // Only None if an operation failed midway. It is reloaded from the store then.
    root_node: Option<DataNode>,
    root_node_id: BlockId,
    node_store: &'a DataNodeStore<B>,
    num_bytes_cache: SizeCache,
}

impl<'a, B: BlockStore> DataTree<'a, B> {
    pub(super) fn new(root_node: DataNode, node_store: &'a DataNodeStore<B>) -> Self {
        Self {
            root_node_id: *root_node.block_id(),
            root_node: Some(root_node),
            node_store,
            num_bytes_cache: SizeCache::SizeUnknown,
        }
    }

    pub fn root_node_id(&self) -> &BlockId {
        &self.root_node_id
    }

    pub async fn num_bytes(&mut self) -> Result<u64> {
        let root = self._take_root().await?;
        let result = self
            .num_bytes_cache
            .get_or_calculate_num_bytes(self.node_store, &root)
            .await;
        self.root_node = Some(root);
        result
    }

    pub async fn num_nodes(&mut self) -> Result<u64> {
        let root = self._take_root().await?;
        let num_leaves = self
            .num_bytes_cache
            .get_or_calculate_num_leaves(self.node_store, &root)
            .await;
        let depth = root.depth();
        self.root_node = Some(root);

        let mut num_nodes_current_level = num_leaves?.get();
        let mut total_num_nodes = num_nodes_current_level;
        for _level in 0..depth {
            num_nodes_current_level = DivCeil::div_ceil(
                num_nodes_current_level,
                u64::from(self.node_store.layout().max_children_per_inner_node()),
            );
            total_num_nodes += num_nodes_current_level;
        }
        Ok(total_num_nodes)
    }

    /// Fails with [OutOfRangeError] if the tree has fewer than `offset + target.len()` bytes.
    pub async fn read_bytes(&mut self, offset: u64, target: &mut [u8]) -> Result<()> {
        let num_bytes = self.num_bytes().await?;
        let target_len = u64::try_from(target.len())?;
        let out_of_range = OutOfRangeError {
            offset,
            len: target_len,
            num_bytes,
        };
        match offset.checked_add(target_len) {
            Some(read_end) if read_end <= num_bytes => {}
            _ => return Err(out_of_range.into()),
        }
        self._do_read_bytes(offset, target).await
    }

    /// Like [DataTree::read_bytes] but stops at the end of the tree. Returns the number of bytes read.
    pub async fn try_read_bytes(&mut self, offset: u64, target: &mut [u8]) -> Result<usize> {
        let num_bytes = self.num_bytes().await?;
        let real_target_len: usize = target
            .len()
            .min(usize::try_from(num_bytes.saturating_sub(offset)).unwrap_or(usize::MAX));
        let real_target = &mut target[..real_target_len];
        self._do_read_bytes(offset, real_target).await?;
        Ok(real_target_len)
    }

    pub async fn read_all(&mut self) -> Result<Data> {
        let num_bytes = self.num_bytes().await?;
        let mut result = Data::from(vec![0; usize::try_from(num_bytes)?]);
        self._do_read_bytes(0, result.as_mut()).await?;
        Ok(result)
    }

    async fn _do_read_bytes(&mut self, offset: u64, target: &mut [u8]) -> Result<()> {
        struct Callbacks<'a> {
            offset: u64,
            target: Mutex<&'a mut [u8]>,
        }
        #[async_trait]
        impl<'a, B: BlockStore> TraversalByByteIndicesCallbacks<B> for Callbacks<'a> {
            async fn on_existing_leaf(
                &self,
                index_of_first_leaf_byte: u64,
                leaf: &mut LeafHandle<'_, B>,
                leaf_data_offset: u32,
                leaf_data_size: u32,
            ) -> Result<()> {
                let leaf = leaf.node().await?;
                let mut target = self
                    .target
                    .lock()
                    .map_err(|_| anyhow!("Read target mutex is poisoned"))?;
                let target_begin = usize::try_from(
                    index_of_first_leaf_byte + u64::from(leaf_data_offset) - self.offset,
                )?;
                let target_end = target_begin + leaf_data_size as usize;
                assert!(
                    target_end <= target.len(),
                    "Writing to target out of bounds: index_of_first_leaf_byte={}, offset={}, leaf_data_offset={}, leaf_data_size={}, target.len={}",
                    index_of_first_leaf_byte,
                    self.offset,
                    leaf_data_offset,
                    leaf_data_size,
                    target.len(),
                );
                let source_begin = leaf_data_offset as usize;
                let source_end = source_begin + leaf_data_size as usize;
                target[target_begin..target_end].copy_from_slice(&leaf.data()[source_begin..source_end]);
                Ok(())
            }
            fn on_create_leaf(&self, _begin_byte: u64, _num_bytes: u32) -> Data {
                panic!("Reading shouldn't create new leaves");
            }
        }
        let size_bytes = u64::try_from(target.len())?;
        self._traverse_leaves_by_byte_indices::<Callbacks, false>(
            offset,
            size_bytes,
            &Callbacks {
                offset,
                target: Mutex::new(target),
            },
        )
        .await
    }

    /// Writes `source` at `offset`. If that goes past the end of the tree, the tree grows first
    /// and any gap between the old end and `offset` reads as zeroes.
    pub async fn write_bytes(&mut self, source: &[u8], offset: u64) -> Result<()> {
        struct Callbacks<'a> {
            layout: NodeLayout,
            offset: u64,
            source: &'a [u8],
        }
        impl<'a> Callbacks<'a> {
            fn source_region(&self, begin_byte: u64, num_bytes: u32) -> &'a [u8] {
                assert!(
                    begin_byte >= self.offset
                        && begin_byte - self.offset + u64::from(num_bytes)
                            <= self.source.len() as u64,
                    "Reading from source out of bounds"
                );
                let source_begin = (begin_byte - self.offset) as usize;
                &self.source[source_begin..source_begin + num_bytes as usize]
            }
        }
        #[async_trait]
        impl<'a, B: BlockStore> TraversalByByteIndicesCallbacks<B> for Callbacks<'a> {
            async fn on_existing_leaf(
                &self,
                index_of_first_leaf_byte: u64,
                leaf: &mut LeafHandle<'_, B>,
                leaf_data_offset: u32,
                leaf_data_size: u32,
            ) -> Result<()> {
                let actual_source = self.source_region(
                    index_of_first_leaf_byte + u64::from(leaf_data_offset),
                    leaf_data_size,
                );
                if leaf_data_offset == 0 && leaf_data_size == self.layout.max_bytes_per_leaf() {
                    leaf.overwrite_data(actual_source).await?;
                } else {
                    let begin = leaf_data_offset as usize;
                    let end = begin + leaf_data_size as usize;
                    leaf.node().await?.data_mut()[begin..end].copy_from_slice(actual_source);
                }
                Ok(())
            }
            fn on_create_leaf(&self, begin_byte: u64, num_bytes: u32) -> Data {
                Data::from(self.source_region(begin_byte, num_bytes))
            }
        }

        self._traverse_leaves_by_byte_indices::<Callbacks, true>(
            offset,
            u64::try_from(source.len())?,
            &Callbacks {
                layout: *self.node_store.layout(),
                offset,
                source,
            },
        )
        .await
    }

    /// Stores the root if it has unflushed changes. All other nodes are stored by the
    /// operations that change them.
    pub async fn flush(&mut self) -> Result<()> {
        match self.root_node.as_mut() {
            Some(root) => self.node_store.flush_node(root).await,
            None => Ok(()),
        }
    }

    pub async fn resize_num_bytes(&mut self, new_num_bytes: u64) -> Result<()> {
        struct Callbacks<'a, B: BlockStore> {
            node_store: &'a DataNodeStore<B>,
            new_num_leaves: NonZeroU64,
            new_last_leaf_size: u32,
        }
        #[async_trait]
        impl<'a, B: BlockStore> traversal::TraversalCallbacks<B> for Callbacks<'a, B> {
            async fn on_existing_leaf(
                &self,
                index: u64,
                _is_right_border_leaf: bool,
                leaf: &mut LeafHandle<'_, B>,
            ) -> Result<()> {
                assert_eq!(self.new_num_leaves.get() - 1, index);
                // Only called if the new last leaf already existed
                let leaf = leaf.node().await?;
                if leaf.num_bytes() != self.new_last_leaf_size {
                    leaf.resize(self.new_last_leaf_size);
                }
                Ok(())
            }
            fn on_create_leaf(&self, index: u64) -> Data {
                assert_eq!(self.new_num_leaves.get() - 1, index);
                // Only called if the new last leaf didn't exist yet
                Data::from(vec![0; self.new_last_leaf_size as usize])
            }
            async fn on_backtrack_from_subtree(&self, node: &mut DataInnerNode) -> Result<()> {
                // Only called for nodes on the new right border. When growing, this is a no-op.
                // When shrinking, it cuts off the children that aren't needed anymore.
                let layout = self.node_store.layout();
                let max_children = u64::from(layout.max_children_per_inner_node());
                let max_leaves_per_child = layout.num_leaves_per_full_subtree(node.depth().get() - 1)?;
                let needed_nodes_on_child_level =
                    DivCeil::div_ceil(self.new_num_leaves.get(), max_leaves_per_child.get());
                let needed_nodes_on_same_level =
                    DivCeil::div_ceil(needed_nodes_on_child_level, max_children);
                let child_level_nodes_covered_by_siblings =
                    (needed_nodes_on_same_level - 1) * max_children;
                let needed_children = u32::try_from(
                    needed_nodes_on_child_level - child_level_nodes_covered_by_siblings,
                )?;
                let needed_children = NonZeroU32::new(needed_children)
                    .ok_or_else(|| anyhow!("Right border node would be left without children"))?;
                let num_children = node.num_children();
                assert!(
                    needed_children <= num_children,
                    "Node has too few children"
                );
                if needed_children == num_children {
                    return Ok(());
                }

                let children_to_delete: Vec<BlockId> =
                    node.children().skip(needed_children.get() as usize).collect();
                let depth = node.depth().get();

                // The parent stops referencing the children before they're removed
                // TODO Cut the right border top-down. Bottom-up, a failure between two levels
                //      leaves the already shortened last leaf in the middle of the tree.
                node.shrink_num_children(needed_children)?;
                node.flush(self.node_store.block_store()).await?;
                log::debug!(
                    "Removing {} subtrees of depth {} from node {}",
                    children_to_delete.len(),
                    depth - 1,
                    node.block_id()
                );
                for_each_unordered(children_to_delete.into_iter(), move |block_id| async move {
                    traversal::remove_subtree_by_root_id(self.node_store, depth - 1, block_id)
                        .await
                })
                .await?;

                Ok(())
            }
        }

        let max_bytes_per_leaf = u64::from(self.node_store.layout().max_bytes_per_leaf());
        let new_num_leaves =
            NonZeroU64::new(DivCeil::div_ceil(new_num_bytes, max_bytes_per_leaf).max(1))
                .expect("Is at least 1");
        let new_last_leaf_size =
            u32::try_from(new_num_bytes - (new_num_leaves.get() - 1) * max_bytes_per_leaf)?;

        let root_node = self._take_root().await?;
        let result = traversal::traverse_and_return_new_root::<B, Callbacks<'_, B>, true>(
            self.node_store,
            root_node,
            new_num_leaves.get() - 1,
            new_num_leaves.get(),
            &Callbacks {
                node_store: self.node_store,
                new_last_leaf_size,
                new_num_leaves,
            },
        )
        .await;
        self._store_new_root(result).await?;

        self.num_bytes_cache
            .update(self.node_store.layout(), new_num_leaves, new_num_bytes)?;
        Ok(())
    }

    /// Removes every node of the tree, the root first.
    pub async fn remove(mut self) -> Result<()> {
        let root_node = self._take_root().await?;
        traversal::remove_subtree(self.node_store, root_node).await
    }

    /// All node ids of the tree, the root first. Leaves are listed without loading them.
    pub fn all_blocks(&self) -> BoxStream<'a, Result<BlockId>> {
        match &self.root_node {
            Some(root) => traversal::all_block_ids_in_subtree(self.node_store, root),
            None => {
                traversal::all_block_ids_in_subtree_of_id(self.node_store, self.root_node_id, None)
            }
        }
    }

    async fn _take_root(&mut self) -> Result<DataNode> {
        match self.root_node.take() {
            Some(root) => Ok(root),
            None => {
                log::debug!("Reloading root node {} of tree", self.root_node_id);
                self.node_store
                    .load(&self.root_node_id)
                    .await?
                    .ok_or_else(|| {
                        NodeNotFoundError {
                            block_id: self.root_node_id,
                        }
                        .into()
                    })
            }
        }
    }

    /// Persists the root after a mutating traversal. If the traversal failed, the in-memory
    /// root is gone and the size cache can't be trusted anymore.
    async fn _store_new_root(&mut self, traversal_result: Result<DataNode>) -> Result<()> {
        let mut new_root = match traversal_result {
            Ok(new_root) => new_root,
            Err(err) => {
                self.num_bytes_cache = SizeCache::SizeUnknown;
                return Err(err);
            }
        };
        assert_eq!(
            self.root_node_id,
            *new_root.block_id(),
            "Traversal changed the root id"
        );
        if let Err(err) = self.node_store.flush_node(&mut new_root).await {
            self.num_bytes_cache = SizeCache::SizeUnknown;
            return Err(err).context("Failed to store the root of the tree");
        }
        self.root_node = Some(new_root);
        Ok(())
    }

    async fn _traverse_leaves_by_byte_indices<
        C: TraversalByByteIndicesCallbacks<B> + Sync,
        const ALLOW_WRITES: bool,
    >(
        &mut self,
        begin_byte: u64,
        size_bytes: u64,
        callbacks: &C,
    ) -> Result<()> {
        if size_bytes == 0 {
            return Ok(());
        }

        let end_byte = begin_byte.checked_add(size_bytes).ok_or_else(|| {
            anyhow!(
                "Overflow in begin_byte+size_bytes: {}+{}",
                begin_byte,
                size_bytes
            )
        })?;
        let max_bytes_per_leaf = u64::from(self.node_store.layout().max_bytes_per_leaf());
        let first_leaf = begin_byte / max_bytes_per_leaf;
        let end_leaf = DivCeil::div_ceil(end_byte, max_bytes_per_leaf);
        struct WrappedCallbacks<'a, B: BlockStore, C: TraversalByByteIndicesCallbacks<B>> {
            layout: NodeLayout,
            begin_byte: u64,
            end_byte: u64,
            first_leaf: u64,
            end_leaf: u64,
            blob_is_growing_from_this_traversal: AtomicBool,
            wrapped: &'a C,
            _b: PhantomData<fn() -> B>,
        }
        impl<'a, B: BlockStore, C: TraversalByByteIndicesCallbacks<B>> WrappedCallbacks<'a, B, C> {
            /// Byte region of the leaf that overlaps the traversal, relative to the leaf begin.
            fn leaf_region(&self, leaf_index: u64) -> (u64, u32, u32) {
                let max_bytes_per_leaf = u64::from(self.layout.max_bytes_per_leaf());
                let index_of_first_leaf_byte = leaf_index * max_bytes_per_leaf;
                assert!(
                    self.end_byte > index_of_first_leaf_byte,
                    "Traversal went to {} which is too far right for end_byte={}",
                    index_of_first_leaf_byte,
                    self.end_byte
                );
                let data_begin = self.begin_byte.saturating_sub(index_of_first_leaf_byte);
                let data_end = max_bytes_per_leaf.min(self.end_byte - index_of_first_leaf_byte);
                // Both are at most max_bytes_per_leaf, which is a u32
                (index_of_first_leaf_byte, data_begin as u32, data_end as u32)
            }
        }
        #[async_trait]
        impl<'a, B: BlockStore, C: TraversalByByteIndicesCallbacks<B> + Sync>
            traversal::TraversalCallbacks<B> for WrappedCallbacks<'a, B, C>
        {
            async fn on_existing_leaf(
                &self,
                leaf_index: u64,
                is_right_border_leaf: bool,
                leaf_handle: &mut LeafHandle<'_, B>,
            ) -> Result<()> {
                let (index_of_first_leaf_byte, data_begin, data_end) = self.leaf_region(leaf_index);
                // If the traversal ends exactly at the last existing leaf, that leaf wasn't grown by the traversal
                // and may be too small.
                if is_right_border_leaf {
                    assert_eq!(
                        leaf_index,
                        self.end_leaf - 1,
                        "If we traversed further right, this wouldn't be the right border leaf."
                    );
                    let leaf = leaf_handle.node().await?;
                    if leaf.num_bytes() < data_end {
                        leaf.resize(data_end);
                        self.blob_is_growing_from_this_traversal
                            .store(true, Ordering::Relaxed);
                    }
                }
                self.wrapped
                    .on_existing_leaf(
                        index_of_first_leaf_byte,
                        leaf_handle,
                        data_begin,
                        data_end - data_begin,
                    )
                    .await
            }
            fn on_create_leaf(&self, leaf_index: u64) -> Data {
                self.blob_is_growing_from_this_traversal
                    .store(true, Ordering::Relaxed);
                let (index_of_first_leaf_byte, data_begin, data_end) = self.leaf_region(leaf_index);
                assert!(
                    leaf_index == self.first_leaf || data_begin == 0,
                    "Only the leftmost leaf can have a gap on the left"
                );
                assert!(
                    leaf_index == self.end_leaf - 1
                        || data_end == self.layout.max_bytes_per_leaf(),
                    "Only the rightmost leaf can have a gap on the right"
                );
                let data = self.wrapped.on_create_leaf(
                    index_of_first_leaf_byte + u64::from(data_begin),
                    data_end - data_begin,
                );
                assert_eq!(
                    data.len(),
                    (data_end - data_begin) as usize,
                    "Returned leaf data with wrong size"
                );
                if data_begin == 0 {
                    data
                } else {
                    // The part of the leaf before the traversed region is a gap and reads as zeroes
                    let mut leaf_data = vec![0; data_end as usize];
                    leaf_data[data_begin as usize..].copy_from_slice(data.as_ref());
                    Data::from(leaf_data)
                }
            }
            async fn on_backtrack_from_subtree(&self, _node: &mut DataInnerNode) -> Result<()> {
                Ok(())
            }
        }

        let wrapped_callbacks = WrappedCallbacks {
            layout: *self.node_store.layout(),
            begin_byte,
            end_byte,
            first_leaf,
            end_leaf,
            wrapped: callbacks,
            blob_is_growing_from_this_traversal: false.into(),
            _b: PhantomData,
        };

        let root_node = self._take_root().await?;
        let result = traversal::traverse_and_return_new_root::<
            B,
            WrappedCallbacks<'_, B, C>,
            ALLOW_WRITES,
        >(
            self.node_store,
            root_node,
            first_leaf,
            end_leaf,
            &wrapped_callbacks,
        )
        .await;
        if ALLOW_WRITES {
            self._store_new_root(result).await?;
        } else {
            match result {
                Ok(root) => self.root_node = Some(root),
                Err(err) => {
                    self.num_bytes_cache = SizeCache::SizeUnknown;
                    return Err(err);
                }
            }
        }

        let blob_is_growing_from_this_traversal = wrapped_callbacks
            .blob_is_growing_from_this_traversal
            .load(Ordering::Relaxed);
        assert!(
            ALLOW_WRITES || !blob_is_growing_from_this_traversal,
            "Blob grew from traversal that didn't allow growing (i.e. reading)"
        );
        if blob_is_growing_from_this_traversal {
            let end_leaf = NonZeroU64::new(end_leaf)
                .expect("end_leaf cannot be zero because we checked above that size_bytes != 0");
            self.num_bytes_cache
                .update(self.node_store.layout(), end_leaf, end_byte)?;
        }

        Ok(())
    }
}

impl<'a, B: BlockStore> Debug for DataTree<'a, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTree")
            .field("root_node_id", &self.root_node_id)
            .field("num_bytes_cache", &self.num_bytes_cache)
            .finish()
    }
}

#[async_trait]
trait TraversalByByteIndicesCallbacks<B: BlockStore> {
    async fn on_existing_leaf(
        &self,
        index_of_first_leaf_byte: u64,
        leaf: &mut LeafHandle<'_, B>,
        leaf_data_offset: u32,
        leaf_data_size: u32,
    ) -> Result<()>;
    fn on_create_leaf(&self, begin_byte: u64, num_bytes: u32) -> Data;
}
