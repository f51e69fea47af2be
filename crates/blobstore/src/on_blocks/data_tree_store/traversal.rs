use anyhow::{anyhow, bail, ensure, Result};
use async_recursion::async_recursion;
use async_trait::async_trait;
use divrem::DivCeil;
use futures::{
    future::{self, FutureExt},
    stream::{self, BoxStream, StreamExt},
};
use thiserror::Error;

use crate::on_blocks::data_node_store::{
    CapacityExceededError, DataInnerNode, DataLeafNode, DataNode, DataNodeStore, NodeLayout,
    NodeNotFoundError, MAX_DEPTH,
};
use cryblocks_blockstore::{BlockId, BlockStore};
use cryblocks_utils::{data::Data, stream::for_each_unordered};

/// A leaf handed to traversal callbacks. Leaves deep in the tree are only loaded
/// if the callback actually looks at them.
pub enum LeafHandle<'a, B: BlockStore> {
    Borrowed {
        leaf: &'a mut DataLeafNode,
    },
    Owned {
        store: &'a DataNodeStore<B>,
        leaf: DataLeafNode,
    },
    NotLoadedYet {
        store: &'a DataNodeStore<B>,
        leaf_block_id: BlockId,
    },
}

impl<'a, B: BlockStore> LeafHandle<'a, B> {
    pub fn new_not_loaded_yet(store: &'a DataNodeStore<B>, leaf_block_id: BlockId) -> Self {
        Self::NotLoadedYet {
            store,
            leaf_block_id,
        }
    }

    pub fn new_borrowed(leaf: &'a mut DataLeafNode) -> Self {
        Self::Borrowed { leaf }
    }

    pub async fn node(&mut self) -> Result<&mut DataLeafNode> {
        if let Self::NotLoadedYet {
            store,
            leaf_block_id,
        } = self
        {
            let store = *store;
            let leaf = match store.load(leaf_block_id).await? {
                None => {
                    return Err(NodeNotFoundError {
                        block_id: *leaf_block_id,
                    }
                    .into())
                }
                Some(DataNode::Inner(inner)) => bail!(
                    "Tried to load leaf node {} but was inner node with depth {}",
                    leaf_block_id,
                    inner.depth()
                ),
                Some(DataNode::Leaf(leaf)) => leaf,
            };
            *self = Self::Owned { store, leaf };
        }
        match self {
            Self::Borrowed { leaf } => Ok(&mut **leaf),
            Self::Owned { leaf, .. } => Ok(leaf),
            Self::NotLoadedYet { .. } => unreachable!("Leaf was loaded above"),
        }
    }

    /// Replace all of the leaf's data. `source` must have exactly as many bytes as the leaf holds.
    pub async fn overwrite_data(&mut self, source: &[u8]) -> Result<()> {
        match self {
            Self::Borrowed { leaf } => leaf.data_mut().copy_from_slice(source),
            Self::Owned { leaf, .. } => leaf.data_mut().copy_from_slice(source),
            Self::NotLoadedYet {
                store,
                leaf_block_id,
            } => {
                // No need to load it, we replace the whole content anyways
                store.overwrite_with_leaf_node(leaf_block_id, source).await?;
            }
        }
        Ok(())
    }

    /// Writes changes back for leaves this handle loaded itself.
    /// A borrowed leaf belongs to the tree, which flushes it.
    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Owned { store, leaf } => leaf.flush(store.block_store()).await,
            Self::Borrowed { .. } | Self::NotLoadedYet { .. } => Ok(()),
        }
    }
}

#[async_trait]
pub trait TraversalCallbacks<B: BlockStore> {
    async fn on_existing_leaf(
        &self,
        leaf_index: u64,
        is_right_border_leaf: bool,
        leaf: &mut LeafHandle<'_, B>,
    ) -> Result<()>;
    fn on_create_leaf(&self, index: u64) -> Data;
    async fn on_backtrack_from_subtree(&self, node: &mut DataInnerNode) -> Result<()>;
}

/// Visit the leaves `begin_index..end_index`, creating leaves and growing the tree depth
/// as needed if `ALLOW_WRITES` is set.
///
/// Every node below the root is flushed after its subtree is done, so parents only ever
/// reference children that are already stored. The returned root may still be dirty.
///
/// Fails with [CapacityExceededError::TreeTooDeep] before writing anything if `end_index`
/// needs a tree deeper than [MAX_DEPTH].
pub async fn traverse_and_return_new_root<
    B: BlockStore,
    C: TraversalCallbacks<B> + Sync,
    const ALLOW_WRITES: bool,
>(
    node_store: &DataNodeStore<B>,
    root: DataNode,
    begin_index: u64,
    end_index: u64,
    callbacks: &C,
) -> Result<DataNode> {
    if ALLOW_WRITES {
        _ensure_max_depth_suffices(node_store.layout(), root.depth(), end_index)?;
    }
    _traverse_and_return_new_root::<B, C, ALLOW_WRITES>(
        node_store,
        root,
        begin_index,
        end_index,
        true,
        callbacks,
    )
    .await
}

async fn _traverse_and_return_new_root<
    B: BlockStore,
    C: TraversalCallbacks<B> + Sync,
    const ALLOW_WRITES: bool,
>(
    node_store: &DataNodeStore<B>,
    mut root: DataNode,
    begin_index: u64,
    end_index: u64,
    is_left_border_of_traversal: bool,
    callbacks: &C,
) -> Result<DataNode> {
    assert!(
        begin_index <= end_index,
        "Called _traverse_and_return_new_root with begin_index={} > end_index={}",
        begin_index,
        end_index
    );

    let max_leaves_for_depth = node_store
        .layout()
        .num_leaves_per_full_subtree(root.depth())?;
    let should_increase_tree_depth = end_index > max_leaves_for_depth.get();
    ensure!(
        ALLOW_WRITES || !should_increase_tree_depth,
        "Tried to grow a tree on a read only traversal. Accessing end_index {} is out of bounds for tree with {} leaves",
        end_index,
        max_leaves_for_depth,
    );

    match &mut root {
        DataNode::Leaf(root) => {
            let max_bytes_per_leaf = node_store.layout().max_bytes_per_leaf();
            if ALLOW_WRITES && should_increase_tree_depth && root.num_bytes() != max_bytes_per_leaf
            {
                root.resize(max_bytes_per_leaf);
            }
            if begin_index == 0 && end_index >= 1 {
                let is_right_border_leaf = end_index == 1;
                callbacks
                    .on_existing_leaf(
                        0,
                        is_right_border_leaf,
                        &mut LeafHandle::new_borrowed(root),
                    )
                    .await?;
            }
        }
        DataNode::Inner(root) => {
            _traverse_existing_subtree_of_inner_node::<B, C, ALLOW_WRITES>(
                node_store,
                root,
                begin_index.min(max_leaves_for_depth.get()),
                end_index.min(max_leaves_for_depth.get()),
                0,
                is_left_border_of_traversal,
                !should_increase_tree_depth,
                should_increase_tree_depth,
                callbacks,
            )
            .await?;
        }
    }

    // A traversal that goes too far right for a tree of this depth adds one level and continues.
    // This repeats until the tree is deep enough, one level at a time, so the tree stays
    // balanced for as long as possible.
    if ALLOW_WRITES && should_increase_tree_depth {
        let root = _increase_tree_depth(node_store, root).await?;
        Box::pin(_traverse_and_return_new_root::<B, C, ALLOW_WRITES>(
            node_store,
            root,
            begin_index.max(max_leaves_for_depth.get()),
            end_index,
            false,
            callbacks,
        ))
        .await
    } else if ALLOW_WRITES {
        // Callbacks may have removed children (e.g. when shrinking), which can leave the root with only one child.
        _while_root_has_only_one_child_replace_root_with_its_child(node_store, root).await
    } else {
        Ok(root)
    }
}

#[allow(clippy::too_many_arguments)]
async fn _traverse_existing_subtree<
    B: BlockStore,
    C: TraversalCallbacks<B> + Sync,
    const ALLOW_WRITES: bool,
>(
    node_store: &DataNodeStore<B>,
    block_id: BlockId,
    depth: u8,
    begin_index: u64,
    end_index: u64,
    leaf_offset: u64,
    is_left_border_of_traversal: bool,
    is_right_border_node: bool,
    grow_last_leaf: bool,
    callbacks: &C,
) -> Result<()> {
    if depth == 0 {
        assert!(
            begin_index <= 1 && end_index <= 1,
            "A leaf is a subtree with only one leaf, access indices must be 0 or 1 but were begin_index={}, end_index={}",
            begin_index,
            end_index
        );
        let mut leaf_handle = LeafHandle::new_not_loaded_yet(node_store, block_id);
        if grow_last_leaf {
            let leaf_node = leaf_handle.node().await?;
            if leaf_node.num_bytes() != node_store.layout().max_bytes_per_leaf() {
                assert!(ALLOW_WRITES, "Can't grow the last leaf in a read-only traversal");
                leaf_node.resize(node_store.layout().max_bytes_per_leaf());
            }
        }
        if begin_index == 0 && end_index == 1 {
            callbacks
                .on_existing_leaf(leaf_offset, is_right_border_node, &mut leaf_handle)
                .await?;
        }
        leaf_handle.flush().await?;
    } else {
        let mut node = match node_store.load(&block_id).await? {
            None => return Err(NodeNotFoundError { block_id }.into()),
            Some(DataNode::Leaf(_)) => {
                bail!("Expected node {} at depth {} but it was a leaf", block_id, depth)
            }
            Some(DataNode::Inner(node)) => node,
        };
        ensure!(
            node.depth().get() == depth,
            "Expected to load an inner node with depth {} but node {} claims to be at depth {}",
            depth,
            block_id,
            node.depth()
        );
        _traverse_existing_subtree_of_inner_node::<B, C, ALLOW_WRITES>(
            node_store,
            &mut node,
            begin_index,
            end_index,
            leaf_offset,
            is_left_border_of_traversal,
            is_right_border_node,
            grow_last_leaf,
            callbacks,
        )
        .await?;
        node.flush(node_store.block_store()).await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn _traverse_existing_subtree_of_inner_node<
    B: BlockStore,
    C: TraversalCallbacks<B> + Sync,
    const ALLOW_WRITES: bool,
>(
    node_store: &DataNodeStore<B>,
    root: &mut DataInnerNode,
    begin_index: u64,
    end_index: u64,
    leaf_offset: u64,
    is_left_border_of_traversal: bool,
    is_right_border_node: bool,
    grow_last_leaf: bool,
    callbacks: &C,
) -> Result<()> {
    assert!(begin_index <= end_index, "Invalid parameters");

    let child_depth = root.depth().get() - 1;
    let leaves_per_child = node_store
        .layout()
        .num_leaves_per_full_subtree(child_depth)?
        .get();
    let begin_child = usize::try_from(begin_index / leaves_per_child)?;
    let end_child = usize::try_from(DivCeil::div_ceil(end_index, leaves_per_child))?;

    assert!(
        end_child <= node_store.layout().max_children_per_inner_node() as usize,
        "Traversal region would need increasing the tree depth. This should have happened before calling this function."
    );
    let children: Vec<BlockId> = root.children().collect();
    let num_children = children.len();
    assert!(
        !grow_last_leaf || end_child >= num_children,
        "Can only grow last leaf if it exists"
    );
    assert!(
        ALLOW_WRITES || end_child <= num_children,
        "Can only traverse out of bounds in a traversal that allows writes"
    );
    let should_grow_last_existing_leaf = grow_last_leaf || end_child > num_children;

    // If the traversal starts right of the existing children, we still have to descend into
    // the last old child to fill it up with leaves and grow its last leaf.
    if is_left_border_of_traversal && begin_child >= num_children {
        let child_offset = child_offset(num_children - 1, leaves_per_child)?;
        struct PanicCallbacks;
        #[async_trait]
        impl<B: BlockStore> TraversalCallbacks<B> for PanicCallbacks {
            async fn on_existing_leaf(
                &self,
                _index: u64,
                _is_right_border_leaf: bool,
                _leaf: &mut LeafHandle<'_, B>,
            ) -> Result<()> {
                panic!("We don't actually traverse any leaves");
            }
            fn on_create_leaf(&self, _index: u64) -> Data {
                panic!("We don't actually traverse any leaves");
            }
            async fn on_backtrack_from_subtree(&self, _node: &mut DataInnerNode) -> Result<()> {
                panic!("We don't actually traverse any leaves");
            }
        }
        Box::pin(_traverse_existing_subtree::<B, PanicCallbacks, ALLOW_WRITES>(
            node_store,
            children[num_children - 1],
            child_depth,
            leaves_per_child,
            leaves_per_child,
            checked_add(leaf_offset, child_offset)?,
            true,
            false,
            true,
            &PanicCallbacks,
        ))
        .await?;
    }

    // Traverse existing children
    let existing_children = children
        .iter()
        .enumerate()
        .skip(begin_child)
        .take(end_child.saturating_sub(begin_child));
    for (child_index, child_block_id) in existing_children {
        let child_offset = child_offset(child_index, leaves_per_child)?;
        let local_begin_index = begin_index.saturating_sub(child_offset);
        let local_end_index = leaves_per_child.min(end_index.checked_sub(child_offset).ok_or_else(
            || {
                anyhow!(
                    "Overflow in end_index - child_offset: {}-{}",
                    end_index,
                    child_offset
                )
            },
        )?);
        let is_first_child = child_index == begin_child;
        let is_last_existing_child = child_index == num_children - 1;
        let is_last_child = is_last_existing_child && num_children == end_child;
        Box::pin(_traverse_existing_subtree::<B, C, ALLOW_WRITES>(
            node_store,
            *child_block_id,
            child_depth,
            local_begin_index,
            local_end_index,
            checked_add(leaf_offset, child_offset)?,
            is_left_border_of_traversal && is_first_child,
            is_right_border_node && is_last_child,
            should_grow_last_existing_leaf && is_last_existing_child,
            callbacks,
        ))
        .await?;
    }

    // Create new children. Gap children are left of the traversal region but right of the old end,
    // they're created full but not handed to the callbacks.
    for child_index in num_children..end_child {
        assert!(ALLOW_WRITES, "Can't create new children in a read-only traversal");
        let child_offset = child_offset(child_index, leaves_per_child)?;
        let local_begin_index = leaves_per_child.min(begin_index.saturating_sub(child_offset));
        let local_end_index = leaves_per_child.min(end_index.checked_sub(child_offset).ok_or_else(
            || {
                anyhow!(
                    "Overflow in end_index - child_offset: {}-{}",
                    end_index,
                    child_offset
                )
            },
        )?);
        struct Callbacks<'a, C> {
            child_index: usize,
            begin_child: usize,
            layout: NodeLayout,
            callbacks: &'a C,
        }
        #[async_trait]
        impl<'a, B: BlockStore, C: TraversalCallbacks<B> + Sync> CreateNewSubtreeCallbacks<B>
            for Callbacks<'a, C>
        {
            fn on_create_leaf(&self, index: u64) -> Data {
                if self.child_index >= self.begin_child {
                    self.callbacks.on_create_leaf(index)
                } else {
                    _create_max_size_leaf(&self.layout)
                }
            }
            async fn on_backtrack_from_subtree(&self, node: &mut DataInnerNode) -> Result<()> {
                self.callbacks.on_backtrack_from_subtree(node).await
            }
        }
        let child = _create_new_subtree(
            node_store,
            local_begin_index,
            local_end_index,
            checked_add(leaf_offset, child_offset)?,
            child_depth,
            &Callbacks {
                child_index,
                begin_child,
                layout: *node_store.layout(),
                callbacks,
            },
        )
        .await?;
        root.add_child(&child)?;
    }

    // This is only a backtrack if we actually visited a leaf here
    if end_index > begin_index {
        callbacks.on_backtrack_from_subtree(root).await?;
    }

    Ok(())
}

fn child_offset(child_index: usize, leaves_per_child: u64) -> Result<u64> {
    u64::try_from(child_index)?
        .checked_mul(leaves_per_child)
        .ok_or_else(|| {
            anyhow!(
                "Overflow in child_index*leaves_per_child: {}*{}",
                child_index,
                leaves_per_child
            )
        })
}

fn checked_add(leaf_offset: u64, child_offset: u64) -> Result<u64> {
    leaf_offset.checked_add(child_offset).ok_or_else(|| {
        anyhow!(
            "Overflow in leaf_offset+child_offset: {}+{}",
            leaf_offset,
            child_offset
        )
    })
}

fn _create_max_size_leaf(layout: &NodeLayout) -> Data {
    Data::from(vec![0; layout.max_bytes_per_leaf() as usize])
}

fn _ensure_max_depth_suffices(layout: &NodeLayout, root_depth: u8, num_leaves: u64) -> Result<()> {
    let mut depth = root_depth;
    loop {
        match layout.num_leaves_per_full_subtree(depth) {
            Ok(capacity) if num_leaves <= capacity.get() => return Ok(()),
            Ok(_) => {}
            // More leaves than fit into a u64, that's more than enough.
            Err(_) => return Ok(()),
        }
        if depth >= MAX_DEPTH {
            return Err(CapacityExceededError::TreeTooDeep {
                depth: depth.saturating_add(1),
                max: MAX_DEPTH,
            }
            .into());
        }
        depth += 1;
    }
}

/// The root keeps its block id. Its old content moves into a new node that becomes its only child.
async fn _increase_tree_depth<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    root: DataNode,
) -> Result<DataNode> {
    // Check before creating the copy so a failure doesn't leave an orphaned node behind
    if root.depth() >= MAX_DEPTH {
        return Err(CapacityExceededError::TreeTooDeep {
            depth: root.depth().saturating_add(1),
            max: MAX_DEPTH,
        }
        .into());
    }
    let copy_of_old_root = node_store.create_new_node_as_copy_from(&root).await?;
    let new_root = root.convert_to_new_inner_node(&copy_of_old_root, node_store.layout())?;
    log::debug!(
        "Increased depth of tree {} to {}",
        new_root.block_id(),
        new_root.depth()
    );
    Ok(DataNode::Inner(new_root))
}

#[async_trait]
trait CreateNewSubtreeCallbacks<B: BlockStore> {
    fn on_create_leaf(&self, index: u64) -> Data;
    async fn on_backtrack_from_subtree(&self, node: &mut DataInnerNode) -> Result<()>;
}

/// Creates and stores a new subtree. The returned node is already flushed.
async fn _create_new_subtree<B: BlockStore, C: CreateNewSubtreeCallbacks<B> + Sync>(
    node_store: &DataNodeStore<B>,
    begin_index: u64,
    end_index: u64,
    leaf_offset: u64,
    depth: u8,
    callbacks: &C,
) -> Result<DataNode> {
    assert!(begin_index <= end_index, "Invalid parameters");

    if 0 == depth {
        assert!(
            begin_index <= 1 && end_index == 1,
            "With depth 0, we can only traverse one or zero leaves (i.e. traverse one leaf or traverse a gap leaf)."
        );
        let leaf_data = if begin_index == 0 {
            callbacks.on_create_leaf(leaf_offset)
        } else {
            _create_max_size_leaf(node_store.layout())
        };
        let leaf = node_store.create_new_leaf_node(&leaf_data).await?;
        Ok(DataNode::Leaf(leaf))
    } else {
        let leaves_per_full_subtree = node_store.layout().num_leaves_per_full_subtree(depth)?;
        assert!(
            end_index <= leaves_per_full_subtree.get(),
            "A subtree of depth {} has at most {} leaves but we need {}",
            depth,
            leaves_per_full_subtree,
            end_index,
        );
        let leaves_per_child = node_store
            .layout()
            .num_leaves_per_full_subtree(depth - 1)?
            .get();
        let begin_child = begin_index / leaves_per_child;
        let end_child = DivCeil::div_ceil(end_index, leaves_per_child);

        let mut children = Vec::with_capacity(usize::try_from(end_child)?);
        // Gap children, i.e. children before the traversal region but after the old end of the tree
        for child_index in 0..begin_child {
            let child_offset = child_index.checked_mul(leaves_per_child).ok_or_else(|| {
                anyhow!(
                    "Overflow in child_index*leaves_per_child: {}*{}",
                    child_index,
                    leaves_per_child
                )
            })?;
            struct GapCallbacks;
            #[async_trait]
            impl<B: BlockStore> CreateNewSubtreeCallbacks<B> for GapCallbacks {
                fn on_create_leaf(&self, _index: u64) -> Data {
                    panic!("We're only creating gap leaves here, not traversing any");
                }
                async fn on_backtrack_from_subtree(&self, _node: &mut DataInnerNode) -> Result<()> {
                    Ok(())
                }
            }
            let child = Box::pin(_create_new_subtree(
                node_store,
                leaves_per_child,
                leaves_per_child,
                checked_add(leaf_offset, child_offset)?,
                depth - 1,
                &GapCallbacks,
            ))
            .await?;
            assert_eq!(child.depth(), depth - 1, "Created child node has wrong depth");
            children.push(*child.block_id());
        }
        // Children inside of the traversal region
        for child_index in begin_child..end_child {
            let child_offset = child_index * leaves_per_child;
            let local_begin_index = begin_index.saturating_sub(child_offset);
            let local_end_index = leaves_per_child.min(end_index - child_offset);
            let child = Box::pin(_create_new_subtree(
                node_store,
                local_begin_index,
                local_end_index,
                checked_add(leaf_offset, child_offset)?,
                depth - 1,
                callbacks,
            ))
            .await?;
            assert_eq!(child.depth(), depth - 1, "Created child node has wrong depth");
            children.push(*child.block_id());
        }

        assert!(!children.is_empty(), "No children created");
        let mut new_node = node_store.create_new_inner_node(depth, &children).await?;

        // This is only a backtrack if we actually created a leaf here
        if end_index > begin_index {
            callbacks.on_backtrack_from_subtree(&mut new_node).await?;
            new_node.flush(node_store.block_store()).await?;
        }

        Ok(DataNode::Inner(new_node))
    }
}

/// Collapses a chain of single-child nodes below the root into the root.
/// The root keeps its block id and takes the content of the first descendant that
/// is a leaf or has more than one child. The root is stored before the collapsed nodes are removed.
async fn _while_root_has_only_one_child_replace_root_with_its_child<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    root: DataNode,
) -> Result<DataNode> {
    let first_child = match &root {
        DataNode::Inner(inner) if inner.num_children().get() == 1 => inner.last_child(),
        _ => return Ok(root),
    };

    let mut collapsed_node_ids = vec![];
    let mut current_id = first_child;
    let new_content = loop {
        let current = node_store
            .load(&current_id)
            .await?
            .ok_or(NodeNotFoundError {
                block_id: current_id,
            })?;
        match &current {
            DataNode::Inner(inner) if inner.num_children().get() == 1 => {
                collapsed_node_ids.push(current_id);
                current_id = inner.last_child();
            }
            _ => break current,
        }
    };

    let old_depth = root.depth();
    let mut new_root = root.overwrite_node_with(&new_content, node_store.layout());
    new_root.flush(node_store.block_store()).await?;
    log::debug!(
        "Decreased depth of tree {} from {} to {}",
        new_root.block_id(),
        old_depth,
        new_root.depth()
    );

    node_store.remove(new_content).await?;
    for_each_unordered(collapsed_node_ids.into_iter(), |block_id| async move {
        node_store.remove_by_id(&block_id).await
    })
    .await?;

    Ok(new_root)
}

/// Removes a subtree whose root is already loaded. The root is removed before its descendants.
pub async fn remove_subtree<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    root: DataNode,
) -> Result<()> {
    match root {
        DataNode::Leaf(leaf) => node_store.remove(leaf.upcast()).await,
        DataNode::Inner(inner) => _remove_subtree_of_inner_node(node_store, inner).await,
    }
}

async fn _remove_subtree_of_inner_node<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    root: DataInnerNode,
) -> Result<()> {
    // Removing the parent first means an interruption leaves unreferenced nodes behind,
    // never a parent that references removed nodes.
    let children: Vec<BlockId> = root.children().collect();
    let depth = root.depth().get();
    node_store.remove(root.upcast()).await?;
    for_each_unordered(children.into_iter(), |child_block_id| {
        remove_subtree_by_root_id(node_store, depth - 1, child_block_id)
    })
    .await
}

#[async_recursion]
pub async fn remove_subtree_by_root_id<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    depth: u8,
    block_id: BlockId,
) -> Result<()> {
    if depth == 0 {
        // Leaves can be removed without loading them
        node_store.remove_by_id(&block_id).await
    } else {
        match node_store.load(&block_id).await? {
            None => Err(NodeNotFoundError { block_id }.into()),
            Some(DataNode::Leaf(_)) => bail!(
                "Tried to load inner node {} for removal but it was a leaf",
                block_id
            ),
            Some(DataNode::Inner(node)) => {
                ensure!(
                    node.depth().get() == depth,
                    "Tried to load inner node {} at depth {} for removal but it had depth {}",
                    block_id,
                    depth,
                    node.depth()
                );
                _remove_subtree_of_inner_node(node_store, node).await
            }
        }
    }
}

/// Ids of all nodes in the subtree. Leaves are listed without loading them.
pub fn all_block_ids_in_subtree<'a, B: BlockStore>(
    node_store: &'a DataNodeStore<B>,
    subtree_root: &DataNode,
) -> BoxStream<'a, Result<BlockId>> {
    let root_id = *subtree_root.block_id();
    match subtree_root {
        DataNode::Leaf(_) => stream::once(future::ready(Ok(root_id))).boxed(),
        DataNode::Inner(inner) => {
            let children: Vec<BlockId> = inner.children().collect();
            let child_depth = inner.depth().get() - 1;
            let descendants = if child_depth == 0 {
                stream::iter(children.into_iter().map(Ok)).boxed()
            } else {
                stream::select_all(children.into_iter().map(|child_id| {
                    all_block_ids_in_subtree_of_id(node_store, child_id, Some(child_depth))
                }))
                .boxed()
            };
            stream::once(future::ready(Ok(root_id)))
                .chain(descendants)
                .boxed()
        }
    }
}

/// Like [all_block_ids_in_subtree] but loads the subtree root first.
/// If `expected_depth` is given, the root must have that depth.
pub fn all_block_ids_in_subtree_of_id<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    subtree_root_id: BlockId,
    expected_depth: Option<u8>,
) -> BoxStream<'_, Result<BlockId>> {
    async move {
        let node = match node_store.load(&subtree_root_id).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                return stream::once(future::ready(Err(anyhow::Error::from(
                    NodeNotFoundError {
                        block_id: subtree_root_id,
                    },
                ))))
                .boxed()
            }
            Err(err) => return stream::once(future::ready(Err(err))).boxed(),
        };
        if let Some(expected_depth) = expected_depth {
            if node.depth() != expected_depth {
                return stream::once(future::ready(Err(anyhow!(
                    "Expected node {} to have depth {} but it has depth {}",
                    subtree_root_id,
                    expected_depth,
                    node.depth()
                ))))
                .boxed();
            }
        }
        all_block_ids_in_subtree(node_store, &node)
    }
    .flatten_stream()
    .boxed()
}

#[derive(Error, Debug)]
pub enum LoadNodeError {
    #[error("Node {node_id} not found")]
    NodeNotFound { node_id: BlockId },

    #[error("Error loading node {node_id}: {error:?}")]
    NodeLoadError {
        node_id: BlockId,
        error: anyhow::Error,
    },
}

impl LoadNodeError {
    pub fn node_id(&self) -> &BlockId {
        match self {
            Self::NodeNotFound { node_id } => node_id,
            Self::NodeLoadError { node_id, .. } => node_id,
        }
    }
}

/// Loads every node of the subtree, leaves included. A node that fails to load
/// shows up as an error item and the rest of the subtree is still visited.
pub async fn load_all_nodes_in_subtree_of_id<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    subtree_root_id: BlockId,
) -> BoxStream<'_, Result<DataNode, LoadNodeError>> {
    match node_store.load(&subtree_root_id).await {
        Ok(Some(node)) => load_all_nodes_in_subtree(node_store, node),
        Ok(None) => stream::once(future::ready(Err(LoadNodeError::NodeNotFound {
            node_id: subtree_root_id,
        })))
        .boxed(),
        Err(error) => stream::once(future::ready(Err(LoadNodeError::NodeLoadError {
            node_id: subtree_root_id,
            error,
        })))
        .boxed(),
    }
}

pub fn load_all_nodes_in_subtree<B: BlockStore>(
    node_store: &DataNodeStore<B>,
    subtree_root: DataNode,
) -> BoxStream<'_, Result<DataNode, LoadNodeError>> {
    match subtree_root {
        DataNode::Leaf(leaf) => stream::once(future::ready(Ok(leaf.upcast()))).boxed(),
        DataNode::Inner(inner) => {
            let descendants = _load_all_nodes_descendants_of(node_store, &inner);
            stream::once(future::ready(Ok(inner.upcast())))
                .chain(descendants)
                .boxed()
        }
    }
}

fn _load_all_nodes_descendants_of<'a, B: BlockStore>(
    node_store: &'a DataNodeStore<B>,
    subtree_root: &DataInnerNode,
) -> BoxStream<'a, Result<DataNode, LoadNodeError>> {
    let children: Vec<BlockId> = subtree_root.children().collect();
    stream::select_all(children.into_iter().map(|child_id| {
        load_all_nodes_in_subtree_of_id(node_store, child_id)
            .flatten_stream()
            .boxed()
    }))
    .boxed()
}
