use byte_unit::Byte;
use futures::future::{self, BoxFuture};

use super::{DataInnerNode, DataLeafNode, DataNode, DataNodeStore, NodeLayout};
use cryblocks_blockstore::{BlockId, InMemoryBlockStore};
use cryblocks_utils::{data::Data, testutils::DataFixture};

pub const PHYSICAL_BLOCK_SIZE_BYTES: u32 = 1024;

const LAYOUT: NodeLayout = NodeLayout {
    block_size_bytes: PHYSICAL_BLOCK_SIZE_BYTES,
};

pub async fn with_nodestore(
    f: impl FnOnce(&DataNodeStore<InMemoryBlockStore>) -> BoxFuture<'_, ()>,
) {
    let mut nodestore = DataNodeStore::new(
        InMemoryBlockStore::new(),
        Byte::from_u64(u64::from(PHYSICAL_BLOCK_SIZE_BYTES)),
    )
    .await
    .unwrap();
    f(&nodestore).await;
    nodestore.async_drop().await.unwrap();
}

pub fn data_fixture(len: usize, seed: u64) -> Data {
    DataFixture::new(seed).get(len)
}

pub fn full_leaf_data(seed: u64) -> Data {
    data_fixture(LAYOUT.max_bytes_per_leaf() as usize, seed)
}

pub fn half_full_leaf_data(seed: u64) -> Data {
    data_fixture(LAYOUT.max_bytes_per_leaf() as usize / 2, seed)
}

pub async fn new_full_leaf_node(nodestore: &DataNodeStore<InMemoryBlockStore>) -> DataLeafNode {
    nodestore
        .create_new_leaf_node(&full_leaf_data(1))
        .await
        .unwrap()
}

pub async fn new_empty_leaf_node(nodestore: &DataNodeStore<InMemoryBlockStore>) -> DataLeafNode {
    nodestore.create_new_leaf_node(&[]).await.unwrap()
}

pub async fn new_full_leaves(
    nodestore: &DataNodeStore<InMemoryBlockStore>,
    num: usize,
) -> Vec<BlockId> {
    future::join_all((0..num).map(|_| new_full_leaf_node(nodestore)))
        .await
        .into_iter()
        .map(|leaf| *leaf.block_id())
        .collect()
}

/// Depth 1, a full leaf and a half full leaf.
pub async fn new_inner_node(nodestore: &DataNodeStore<InMemoryBlockStore>) -> DataInnerNode {
    let leaf1 = new_full_leaf_node(nodestore).await;
    let leaf2 = nodestore
        .create_new_leaf_node(&half_full_leaf_data(2))
        .await
        .unwrap();
    nodestore
        .create_new_inner_node(1, &[*leaf1.block_id(), *leaf2.block_id()])
        .await
        .unwrap()
}

pub async fn new_full_inner_node(nodestore: &DataNodeStore<InMemoryBlockStore>) -> DataInnerNode {
    let leaves = new_full_leaves(nodestore, LAYOUT.max_children_per_inner_node() as usize).await;
    nodestore.create_new_inner_node(1, &leaves).await.unwrap()
}

pub async fn load_node(
    nodestore: &DataNodeStore<InMemoryBlockStore>,
    block_id: BlockId,
) -> DataNode {
    nodestore.load(&block_id).await.unwrap().unwrap()
}

pub async fn load_inner_node(
    nodestore: &DataNodeStore<InMemoryBlockStore>,
    block_id: BlockId,
) -> DataInnerNode {
    let DataNode::Inner(inner) = load_node(nodestore, block_id).await else {
        panic!("Expected to load an inner node but got a leaf node instead");
    };
    inner
}

pub async fn load_leaf_node(
    nodestore: &DataNodeStore<InMemoryBlockStore>,
    block_id: BlockId,
) -> DataLeafNode {
    let DataNode::Leaf(leaf) = load_node(nodestore, block_id).await else {
        panic!("Expected to load a leaf node but got an inner node instead");
    };
    leaf
}
