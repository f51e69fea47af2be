use anyhow::Result;
use async_trait::async_trait;
use byte_unit::Byte;
use futures::stream::BoxStream;

use super::{
    traversal::{self, LoadNodeError},
    tree::DataTree,
};
use crate::on_blocks::data_node_store::{DataNode, DataNodeStore};
use cryblocks_blockstore::{BlockId, BlockStore, RemoveResult};
use cryblocks_utils::async_drop::{AsyncDrop, AsyncDropGuard};

/// Creates, loads and removes trees. A tree is identified by the block id of its root node.
#[derive(Debug)]
pub struct DataTreeStore<B: BlockStore> {
    node_store: AsyncDropGuard<DataNodeStore<B>>,
}

impl<B: BlockStore> DataTreeStore<B> {
    pub async fn new(
        block_store: AsyncDropGuard<B>,
        physical_block_size: Byte,
    ) -> Result<AsyncDropGuard<Self>> {
        Ok(AsyncDropGuard::new(Self {
            node_store: DataNodeStore::new(block_store, physical_block_size).await?,
        }))
    }

    pub async fn load_tree(&self, root_node_id: BlockId) -> Result<Option<DataTree<'_, B>>> {
        Ok(self
            .node_store
            .load(&root_node_id)
            .await?
            .map(|root_node| DataTree::new(root_node, &self.node_store)))
    }

    /// A new tree is a single empty leaf.
    pub async fn create_tree(&self) -> Result<DataTree<'_, B>> {
        let new_leaf = self.node_store.create_new_leaf_node(&[]).await?;
        Ok(DataTree::new(new_leaf.upcast(), &self.node_store))
    }

    /// `Ok(None)` if a block with this id already exists.
    pub async fn try_create_tree(&self, id: BlockId) -> Result<Option<DataTree<'_, B>>> {
        let new_leaf = self.node_store.try_create_new_leaf_node(id, &[]).await?;
        Ok(new_leaf.map(|new_leaf| DataTree::new(new_leaf.upcast(), &self.node_store)))
    }

    pub async fn remove_tree_by_id(&self, root_node_id: BlockId) -> Result<RemoveResult> {
        match self.load_tree(root_node_id).await? {
            Some(tree) => {
                tree.remove().await?;
                Ok(RemoveResult::SuccessfullyRemoved)
            }
            None => Ok(RemoveResult::NotRemovedBecauseItDoesntExist),
        }
    }

    pub async fn num_nodes(&self) -> Result<u64> {
        self.node_store.num_nodes().await
    }

    pub fn virtual_block_size_bytes(&self) -> u32 {
        self.node_store.virtual_block_size_bytes()
    }

    /// Loads any node, whether it is the root of a tree or not. `Ok(None)` if there is no such node.
    pub async fn load_node(&self, id: &BlockId) -> Result<Option<DataNode>> {
        self.node_store.load(id).await
    }

    /// `Ok(None)` if there is no such node.
    pub async fn load_block_depth(&self, id: &BlockId) -> Result<Option<u8>> {
        Ok(self.node_store.load(id).await?.map(|node| node.depth()))
    }

    pub async fn load_all_nodes_in_subtree_of_id(
        &self,
        subtree_root_id: BlockId,
    ) -> BoxStream<'_, Result<DataNode, LoadNodeError>> {
        traversal::load_all_nodes_in_subtree_of_id(&self.node_store, subtree_root_id).await
    }

    /// Every node in the underlying store, whether it belongs to a tree or not.
    pub async fn all_nodes(&self) -> Result<BoxStream<'static, Result<BlockId>>> {
        self.node_store.all_nodes().await
    }

    #[cfg(test)]
    pub(super) fn node_store(&self) -> &DataNodeStore<B> {
        &self.node_store
    }
}

#[async_trait]
impl<B: BlockStore> AsyncDrop for DataTreeStore<B> {
    type Error = anyhow::Error;

    async fn async_drop_impl(&mut self) -> Result<(), Self::Error> {
        self.node_store.async_drop().await
    }
}
