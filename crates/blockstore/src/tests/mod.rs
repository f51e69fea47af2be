//! Test suite for the [BlockStore] contract. Implement [Fixture] for a store and
//! call [instantiate_blockstore_tests!](crate::instantiate_blockstore_tests) to run it.

#![allow(non_snake_case)]

use async_trait::async_trait;
use futures::stream::TryStreamExt;

use crate::{
    BlockId, BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter, RemoveResult,
    TryCreateResult,
};
use cryblocks_utils::async_drop::AsyncDropGuard;
use cryblocks_utils::data::Data;
use cryblocks_utils::testutils::{assert_unordered_vec_eq, DataFixture};

/// Creates the block store a test case runs against. The fixture lives as long as the
/// test case, so it can own resources like temporary directories.
#[async_trait]
pub trait Fixture {
    type ConcreteBlockStore: BlockStore;

    fn new() -> Self;

    async fn store(&mut self) -> AsyncDropGuard<Self::ConcreteBlockStore>;
}

pub fn blockid(seed: u64) -> BlockId {
    BlockId::from_slice(DataFixture::new(seed).get(16).as_ref()).unwrap()
}

pub fn data(size: usize, seed: u64) -> Data {
    DataFixture::new(seed).get(size)
}

async fn all_blocks<B: BlockStore>(store: &B) -> Vec<BlockId> {
    store
        .all_blocks()
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

pub mod try_create {
    use super::*;

    pub async fn test_givenEmptyBlockStore_whenTryCreatingBlock_thenSucceeds(mut f: impl Fixture) {
        let mut store = f.store().await;
        for (seed, size) in [(1, 0), (2, 1024)] {
            let status = store
                .try_create(&blockid(seed), data(size, seed).as_ref())
                .await
                .unwrap();
            assert_eq!(TryCreateResult::SuccessfullyCreated, status);
            assert_eq!(
                Some(data(size, seed)),
                store.load(&blockid(seed)).await.unwrap()
            );
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenTryCreatingExistingBlock_thenFailsAndKeepsOldData(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        let status = store
            .try_create(&blockid(1), data(1024, 1).as_ref())
            .await
            .unwrap();
        assert_eq!(
            TryCreateResult::NotCreatedBecauseBlockIdAlreadyExists,
            status
        );
        assert_eq!(Some(data(1024, 0)), store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_whenCreatingWithRandomId_thenBlockIsLoadable(mut f: impl Fixture) {
        let mut store = f.store().await;
        let id1 = store.create(data(512, 1).as_ref()).await.unwrap();
        let id2 = store.create(data(512, 2).as_ref()).await.unwrap();
        assert_ne!(id1, id2);
        assert_eq!(Some(data(512, 1)), store.load(&id1).await.unwrap());
        assert_eq!(Some(data(512, 2)), store.load(&id2).await.unwrap());
        store.async_drop().await.unwrap();
    }
}

pub mod load {
    use super::*;

    pub async fn test_givenEmptyBlockStore_whenLoadingNonexistingBlock_thenReturnsNone(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        assert_eq!(None, store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenLoadingNonexistingBlock_thenReturnsNone(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        assert_eq!(None, store.load(&blockid(2)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenLoadingEmptyBlock_thenReturnsEmptyData(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), &[]).await.unwrap();
        store.store(&blockid(2), data(1024, 0).as_ref()).await.unwrap();
        assert_eq!(Some(Data::empty()), store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }
}

pub mod store {
    use super::*;

    pub async fn test_givenEmptyBlockStore_whenStoringBlock_thenIsLoadable(mut f: impl Fixture) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        assert_eq!(Some(data(1024, 0)), store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenOverwritingBlock_thenNewDataIsLoadable(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        store.store(&blockid(2), data(1024, 1).as_ref()).await.unwrap();
        store.store(&blockid(1), data(512, 2).as_ref()).await.unwrap();
        assert_eq!(Some(data(512, 2)), store.load(&blockid(1)).await.unwrap());
        assert_eq!(Some(data(1024, 1)), store.load(&blockid(2)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenOverwritingWithEmptyData_thenIsEmpty(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        store.store(&blockid(1), &[]).await.unwrap();
        assert_eq!(Some(Data::empty()), store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }
}

pub mod remove {
    use super::*;

    pub async fn test_givenNonEmptyBlockStore_whenRemovingBlock_thenIsNotLoadableAnymore(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        store.store(&blockid(2), data(1024, 1).as_ref()).await.unwrap();
        assert_eq!(
            RemoveResult::SuccessfullyRemoved,
            store.remove(&blockid(1)).await.unwrap()
        );
        assert_eq!(None, store.load(&blockid(1)).await.unwrap());
        assert_eq!(Some(data(1024, 1)), store.load(&blockid(2)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenEmptyBlockStore_whenRemovingNonexistingBlock_thenReportsIt(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        assert_eq!(
            RemoveResult::NotRemovedBecauseItDoesntExist,
            store.remove(&blockid(1)).await.unwrap()
        );
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_whenRemovingNonexistingBlock_thenReportsIt(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        assert_eq!(
            RemoveResult::NotRemovedBecauseItDoesntExist,
            store.remove(&blockid(2)).await.unwrap()
        );
        assert_eq!(Some(data(1024, 0)), store.load(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }
}

pub mod num_blocks {
    use super::*;

    pub async fn test_givenEmptyBlockStore_thenIsZero(mut f: impl Fixture) {
        let mut store = f.store().await;
        assert_eq!(0, store.num_blocks().await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_afterAddingAndRemovingBlocks_thenIsCorrect(mut f: impl Fixture) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        assert_eq!(1, store.num_blocks().await.unwrap());
        let _ = store
            .try_create(&blockid(2), data(1024, 1).as_ref())
            .await
            .unwrap();
        assert_eq!(2, store.num_blocks().await.unwrap());
        store.store(&blockid(1), data(10, 2).as_ref()).await.unwrap();
        assert_eq!(2, store.num_blocks().await.unwrap());
        let _ = store.remove(&blockid(1)).await.unwrap();
        assert_eq!(1, store.num_blocks().await.unwrap());
        store.async_drop().await.unwrap();
    }
}

pub mod all_blocks {
    use super::*;

    pub async fn test_givenEmptyBlockStore_thenIsEmpty(mut f: impl Fixture) {
        let mut store = f.store().await;
        assert_eq!(Vec::<BlockId>::new(), all_blocks(&*store).await);
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenBlockStoreWithThreeBlocks_thenListsAll(mut f: impl Fixture) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        store.store(&blockid(2), &[]).await.unwrap();
        store.store(&blockid(3), data(10, 1).as_ref()).await.unwrap();
        assert_unordered_vec_eq(
            vec![blockid(1), blockid(2), blockid(3)],
            all_blocks(&*store).await,
        );
        store.async_drop().await.unwrap();
    }

    pub async fn test_afterRemovingBlock_thenDoesntListIt(mut f: impl Fixture) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        store.store(&blockid(2), data(1024, 1).as_ref()).await.unwrap();
        let _ = store.remove(&blockid(1)).await.unwrap();
        assert_eq!(vec![blockid(2)], all_blocks(&*store).await);
        store.async_drop().await.unwrap();
    }
}

pub mod exists {
    use super::*;

    pub async fn test_givenEmptyBlockStore_thenReturnsFalse(mut f: impl Fixture) {
        let mut store = f.store().await;
        assert!(!store.exists(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlockStore_thenReturnsWhetherBlockExists(mut f: impl Fixture) {
        let mut store = f.store().await;
        store.store(&blockid(1), data(1024, 0).as_ref()).await.unwrap();
        assert!(store.exists(&blockid(1)).await.unwrap());
        assert!(!store.exists(&blockid(2)).await.unwrap());
        let _ = store.remove(&blockid(1)).await.unwrap();
        assert!(!store.exists(&blockid(1)).await.unwrap());
        store.async_drop().await.unwrap();
    }
}

#[macro_export]
macro_rules! _instantiate_blockstore_tests {
    (@module $module_name: ident, $target: ty, $tokio_test_args: tt $(, $test_cases: ident)* $(,)?) => {
        mod $module_name {
            use super::*;

            $crate::_instantiate_blockstore_tests!(@module_impl $module_name, $target, $tokio_test_args $(, $test_cases)*);
        }
    };
    (@module_impl $module_name: ident, $target: ty, $tokio_test_args: tt) => {
    };
    (@module_impl $module_name: ident, $target: ty, $tokio_test_args: tt, $head_test_case: ident $(, $tail_test_cases: ident)*) => {
        #[tokio::test$tokio_test_args]
        #[allow(non_snake_case)]
        async fn $head_test_case() {
            let fixture = <$target as $crate::tests::Fixture>::new();
            $crate::tests::$module_name::$head_test_case(fixture).await
        }
        $crate::_instantiate_blockstore_tests!(@module_impl $module_name, $target, $tokio_test_args $(, $tail_test_cases)*);
    };
}

/// Instantiate the whole block store test suite for a [Fixture].
/// Pass tokio test arguments as the second parameter, e.g. `(flavor = "multi_thread")`.
#[macro_export]
macro_rules! instantiate_blockstore_tests {
    ($target: ty) => {
        $crate::instantiate_blockstore_tests!($target, ());
    };
    ($target: ty, $tokio_test_args: tt) => {
        $crate::_instantiate_blockstore_tests!(@module try_create, $target, $tokio_test_args,
            test_givenEmptyBlockStore_whenTryCreatingBlock_thenSucceeds,
            test_givenNonEmptyBlockStore_whenTryCreatingExistingBlock_thenFailsAndKeepsOldData,
            test_whenCreatingWithRandomId_thenBlockIsLoadable,
        );
        $crate::_instantiate_blockstore_tests!(@module load, $target, $tokio_test_args,
            test_givenEmptyBlockStore_whenLoadingNonexistingBlock_thenReturnsNone,
            test_givenNonEmptyBlockStore_whenLoadingNonexistingBlock_thenReturnsNone,
            test_givenNonEmptyBlockStore_whenLoadingEmptyBlock_thenReturnsEmptyData,
        );
        $crate::_instantiate_blockstore_tests!(@module store, $target, $tokio_test_args,
            test_givenEmptyBlockStore_whenStoringBlock_thenIsLoadable,
            test_givenNonEmptyBlockStore_whenOverwritingBlock_thenNewDataIsLoadable,
            test_givenNonEmptyBlockStore_whenOverwritingWithEmptyData_thenIsEmpty,
        );
        $crate::_instantiate_blockstore_tests!(@module remove, $target, $tokio_test_args,
            test_givenNonEmptyBlockStore_whenRemovingBlock_thenIsNotLoadableAnymore,
            test_givenEmptyBlockStore_whenRemovingNonexistingBlock_thenReportsIt,
            test_givenNonEmptyBlockStore_whenRemovingNonexistingBlock_thenReportsIt,
        );
        $crate::_instantiate_blockstore_tests!(@module num_blocks, $target, $tokio_test_args,
            test_givenEmptyBlockStore_thenIsZero,
            test_afterAddingAndRemovingBlocks_thenIsCorrect,
        );
        $crate::_instantiate_blockstore_tests!(@module all_blocks, $target, $tokio_test_args,
            test_givenEmptyBlockStore_thenIsEmpty,
            test_givenBlockStoreWithThreeBlocks_thenListsAll,
            test_afterRemovingBlock_thenDoesntListIt,
        );
        $crate::_instantiate_blockstore_tests!(@module exists, $target, $tokio_test_args,
            test_givenEmptyBlockStore_thenReturnsFalse,
            test_givenNonEmptyBlockStore_thenReturnsWhetherBlockExists,
        );
    };
}
