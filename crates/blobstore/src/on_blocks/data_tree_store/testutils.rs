use byte_unit::Byte;
use divrem::DivCeil;
use futures::future::{self, BoxFuture};

use super::super::data_node_store::DataNodeStore;
use super::{store::DataTreeStore, tree::DataTree};
use cryblocks_blockstore::{BlockId, BlockStore, InMemoryBlockStore};
use cryblocks_utils::{data::Data, testutils::DataFixture};

pub const PHYSICAL_BLOCK_SIZE_BYTES: u32 = 128;

pub async fn with_treestore(
    f: impl FnOnce(&DataTreeStore<InMemoryBlockStore>) -> BoxFuture<'_, ()>,
) {
    with_treestore_with_blocksize(PHYSICAL_BLOCK_SIZE_BYTES, f).await
}

pub async fn with_treestore_with_blocksize(
    block_size_bytes: u32,
    f: impl FnOnce(&DataTreeStore<InMemoryBlockStore>) -> BoxFuture<'_, ()>,
) {
    let mut treestore = DataTreeStore::new(
        InMemoryBlockStore::new(),
        Byte::from_u64(u64::from(block_size_bytes)),
    )
    .await
    .unwrap();
    f(&treestore).await;
    treestore.async_drop().await.unwrap();
}

/// Gives access to the nodes of the trees in the store.
pub async fn with_treestore_and_nodestore(
    f: impl for<'a> FnOnce(
        &'a DataTreeStore<InMemoryBlockStore>,
        &'a DataNodeStore<InMemoryBlockStore>,
    ) -> BoxFuture<'a, ()>,
) {
    with_treestore_and_nodestore_with_blocksize(PHYSICAL_BLOCK_SIZE_BYTES, f).await
}

pub async fn with_treestore_and_nodestore_with_blocksize(
    block_size_bytes: u32,
    f: impl for<'a> FnOnce(
        &'a DataTreeStore<InMemoryBlockStore>,
        &'a DataNodeStore<InMemoryBlockStore>,
    ) -> BoxFuture<'a, ()>,
) {
    with_treestore_with_blocksize(block_size_bytes, |treestore| {
        f(treestore, treestore.node_store())
    })
    .await
}

pub fn data(size: usize, seed: u64) -> Data {
    DataFixture::new(seed).get(size)
}

pub async fn create_multi_leaf_tree<B: BlockStore>(
    store: &DataTreeStore<B>,
    num_leaves: u64,
) -> DataTree<'_, B> {
    let mut tree = store.create_tree().await.unwrap();
    tree.resize_num_bytes(num_leaves * u64::from(store.virtual_block_size_bytes()))
        .await
        .unwrap();
    tree
}

/// A tree with known content, to check later that it wasn't touched.
pub struct TreeFixture {
    root_id: BlockId,
    data_seed: u64,
    num_bytes: usize,
}

impl TreeFixture {
    pub async fn create_tree_with_data<B: BlockStore>(
        store: &DataTreeStore<B>,
        num_bytes: usize,
        data_seed: u64,
    ) -> Self {
        let mut tree = store.create_tree().await.unwrap();
        tree.write_bytes(data(num_bytes, data_seed).as_ref(), 0)
            .await
            .unwrap();
        TreeFixture {
            root_id: *tree.root_node_id(),
            data_seed,
            num_bytes,
        }
    }

    pub fn root_id(&self) -> BlockId {
        self.root_id
    }

    pub async fn num_nodes<B: BlockStore>(&self, store: &DataTreeStore<B>) -> u64 {
        let mut tree = store.load_tree(self.root_id).await.unwrap().unwrap();
        tree.num_nodes().await.unwrap()
    }

    pub async fn assert_data_is_still_intact<B: BlockStore>(&self, store: &DataTreeStore<B>) {
        let mut tree = store.load_tree(self.root_id).await.unwrap().unwrap();
        assert_eq!(self.num_bytes as u64, tree.num_bytes().await.unwrap());
        let mut target = vec![0; self.num_bytes];
        tree.read_bytes(0, &mut target).await.unwrap();
        assert_eq!(data(self.num_bytes, self.data_seed).as_ref(), &target[..]);
    }
}

/// Builds a tree bottom up directly through the node store, without using the tree algorithms.
/// `leaf_data` gets the byte offset of the leaf and its size.
pub async fn manually_create_tree<B: BlockStore>(
    nodestore: &DataNodeStore<B>,
    num_full_leaves: u64,
    last_leaf_num_bytes: u64,
    leaf_data: impl Fn(u64, usize) -> Data,
) -> BlockId {
    let max_bytes_per_leaf = nodestore.layout().max_bytes_per_leaf();
    let max_children = nodestore.layout().max_children_per_inner_node() as usize;

    let mut leaf_contents: Vec<Data> = (0..num_full_leaves)
        .map(|leaf_index| {
            leaf_data(
                leaf_index * u64::from(max_bytes_per_leaf),
                max_bytes_per_leaf as usize,
            )
        })
        .collect();
    leaf_contents.push(leaf_data(
        num_full_leaves * u64::from(max_bytes_per_leaf),
        last_leaf_num_bytes as usize,
    ));
    let mut nodes: Vec<BlockId> = future::join_all(leaf_contents.iter().map(|content| async move {
        *nodestore
            .create_new_leaf_node(content.as_ref())
            .await
            .unwrap()
            .block_id()
    }))
    .await;

    let mut depth = 1;
    while nodes.len() > 1 {
        let mut inner_nodes = Vec::with_capacity(DivCeil::div_ceil(nodes.len(), max_children));
        for children in nodes.chunks(max_children) {
            let inner = nodestore
                .create_new_inner_node(depth, children)
                .await
                .unwrap();
            inner_nodes.push(*inner.block_id());
        }
        nodes = inner_nodes;
        depth += 1;
    }
    nodes[0]
}

pub const fn expected_depth_for_num_leaves(num_leaves: u64, max_children: u64) -> u8 {
    let mut depth = 0;
    let mut capacity = 1;
    while capacity < num_leaves {
        capacity *= max_children;
        depth += 1;
    }
    depth
}

pub const fn expected_num_nodes_for_num_leaves(num_leaves: u64, max_children: u64) -> u64 {
    let mut num_nodes = num_leaves;
    let mut num_nodes_current_level = num_leaves;
    while num_nodes_current_level > 1 {
        num_nodes_current_level = (num_nodes_current_level + max_children - 1) / max_children;
        num_nodes += num_nodes_current_level;
    }
    num_nodes
}
