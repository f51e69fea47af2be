#![allow(non_snake_case)]

use crate::{Blob, BlobId, BlobStore, RemoveResult};
use cryblocks_utils::testutils::DataFixture;

pub use fixture::Fixture;

const DATA_SIZE: usize = 5000;

fn data(size: usize, seed: u64) -> cryblocks_utils::data::Data {
    DataFixture::new(seed).get(size)
}

pub mod create {
    use super::*;

    pub async fn test_whenCreatingBlob_thenItIsEmpty(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            assert_eq!(0, blob.num_bytes().await.unwrap());
            assert!(blob.read_all().await.unwrap().is_empty());
            assert_eq!(1, blob.num_nodes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_whenCreatingTwoBlobs_thenTheyHaveDifferentIds(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let blob1 = store.create().await.unwrap();
            let blob2 = store.create().await.unwrap();
            assert_ne!(blob1.id(), blob2.id());
            assert_eq!(2, store.num_nodes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_whenCreatingBlob_thenCanBeLoaded(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let blob_id = store.create().await.unwrap().id();
            let mut loaded = store.load(&blob_id).await.unwrap().unwrap();
            assert_eq!(blob_id, loaded.id());
            assert_eq!(0, loaded.num_bytes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }
}

pub mod try_create {
    use super::*;

    pub async fn test_givenNonexistingId_whenTryCreating_thenSucceedsWithThatId(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            let blob_id = BlobId::from_hex("1491BB4932A389EE14BC7090AC772972").unwrap();
            let blob = store.try_create(&blob_id).await.unwrap().unwrap();
            assert_eq!(blob_id, blob.id());
            drop(blob);
            assert!(store.load(&blob_id).await.unwrap().is_some());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenExistingId_whenTryCreating_thenReturnsNoneAndKeepsData(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            let blob_id = BlobId::from_hex("1491BB4932A389EE14BC7090AC772972").unwrap();
            let mut blob = store.try_create(&blob_id).await.unwrap().unwrap();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            drop(blob);

            assert!(store.try_create(&blob_id).await.unwrap().is_none());

            let mut loaded = store.load(&blob_id).await.unwrap().unwrap();
            assert_eq!(data(DATA_SIZE, 1), loaded.read_all().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }
}

pub mod load {
    use super::*;

    pub async fn test_givenEmptyBlobstore_whenLoadingNonexistingBlob_thenReturnsNone(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            let loaded = store
                .load(&BlobId::from_hex("1491BB4932A389EE14BC7090AC772972").unwrap())
                .await
                .unwrap();
            assert!(loaded.is_none());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonEmptyBlobstore_whenLoadingNonexistingBlob_thenReturnsNone(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            store
                .try_create(&BlobId::from_hex("AB0DC45269804AC6B1CF95391895DDF1").unwrap())
                .await
                .unwrap();

            let loaded = store
                .load(&BlobId::from_hex("1491BB4932A389EE14BC7090AC772972").unwrap())
                .await
                .unwrap();
            assert!(loaded.is_none());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenWrittenBlob_whenLoading_thenHasSameData(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            let blob_id = blob.id();
            blob.write(&data(DATA_SIZE, 2), 100).await.unwrap();
            blob.flush().await.unwrap();
            drop(blob);

            let mut loaded = store.load(&blob_id).await.unwrap().unwrap();
            assert_eq!(DATA_SIZE as u64 + 100, loaded.num_bytes().await.unwrap());
            let mut target = vec![0; DATA_SIZE];
            loaded.read(&mut target, 100).await.unwrap();
            assert_eq!(data(DATA_SIZE, 2).as_ref(), &target[..]);
            let mut prefix = vec![1; 100];
            loaded.read(&mut prefix, 0).await.unwrap();
            assert_eq!(vec![0; 100], prefix);
        }
        store.async_drop().await.unwrap();
    }
}

pub mod remove_by_id {
    use super::*;

    pub async fn test_givenExistingBlob_whenRemoving_thenIsGone(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            let blob_id = blob.id();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            drop(blob);

            assert_eq!(
                RemoveResult::SuccessfullyRemoved,
                store.remove_by_id(&blob_id).await.unwrap()
            );
            assert!(store.load(&blob_id).await.unwrap().is_none());
            assert_eq!(0, store.num_nodes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenNonexistingBlob_whenRemoving_thenReturnsNotRemoved(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            store.create().await.unwrap();
            assert_eq!(
                RemoveResult::NotRemovedBecauseItDoesntExist,
                store
                    .remove_by_id(&BlobId::from_hex("1491BB4932A389EE14BC7090AC772972").unwrap())
                    .await
                    .unwrap()
            );
            assert_eq!(1, store.num_nodes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_givenOtherBlobs_whenRemoving_thenOtherBlobsAreUnaffected(
        mut f: impl Fixture,
    ) {
        let mut store = f.store().await;
        {
            let mut blob1 = store.create().await.unwrap();
            blob1.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            let blob1_id = blob1.id();
            let blob1_num_nodes = blob1.num_nodes().await.unwrap();
            drop(blob1);
            let mut blob2 = store.create().await.unwrap();
            blob2.write(&data(DATA_SIZE, 2), 0).await.unwrap();
            let blob2_id = blob2.id();
            drop(blob2);

            store.remove_by_id(&blob2_id).await.unwrap();

            assert_eq!(blob1_num_nodes, store.num_nodes().await.unwrap());
            let mut blob1 = store.load(&blob1_id).await.unwrap().unwrap();
            assert_eq!(data(DATA_SIZE, 1), blob1.read_all().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }
}

pub mod blob {
    use super::*;
    use futures::TryStreamExt;

    pub async fn test_whenRemovingBlob_thenAllItsNodesAreGone(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            assert!(store.num_nodes().await.unwrap() > 1);
            blob.remove().await.unwrap();
            assert_eq!(0, store.num_nodes().await.unwrap());
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_whenResizing_thenDataIsKeptAndGrowthIsZero(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            blob.resize(100).await.unwrap();
            assert_eq!(100, blob.num_bytes().await.unwrap());
            blob.resize(DATA_SIZE as u64).await.unwrap();

            let content = blob.read_all().await.unwrap();
            assert_eq!(&data(DATA_SIZE, 1)[..100], &content[..100]);
            assert!(content[100..].iter().all(|b| *b == 0));
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_whenReadingOutOfRange_thenReadFailsAndTryReadIsShort(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();

            let mut target = vec![0; 100];
            assert!(blob.read(&mut target, DATA_SIZE as u64 - 50).await.is_err());
            assert_eq!(
                50,
                blob.try_read(&mut target, DATA_SIZE as u64 - 50)
                    .await
                    .unwrap()
            );
            assert_eq!(&data(DATA_SIZE, 1)[DATA_SIZE - 50..], &target[..50]);
        }
        store.async_drop().await.unwrap();
    }

    pub async fn test_allBlocks_areExactlyTheBlobsNodes(mut f: impl Fixture) {
        let mut store = f.store().await;
        {
            let mut blob = store.create().await.unwrap();
            blob.write(&data(DATA_SIZE, 1), 0).await.unwrap();
            let blocks: Vec<_> = blob.all_blocks().try_collect().await.unwrap();
            assert_eq!(blob.id().to_root_block_id(), &blocks[0]);
            assert_eq!(blob.num_nodes().await.unwrap(), blocks.len() as u64);
            assert_eq!(store.num_nodes().await.unwrap(), blocks.len() as u64);
        }
        store.async_drop().await.unwrap();
    }
}

#[macro_export]
macro_rules! _instantiate_blobstore_tests {
    (@module $module_name: ident, $target: ty, $tokio_test_args: tt $(, $test_cases: ident)* $(,)?) => {
        mod $module_name {
            use super::*;

            $crate::_instantiate_blobstore_tests!(@module_impl $module_name, $target, $tokio_test_args $(, $test_cases)*);
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
        $crate::_instantiate_blobstore_tests!(@module_impl $module_name, $target, $tokio_test_args $(, $tail_test_cases)*);
    };
}

/// This macro instantiates all blobstore tests for a given blobstore.
/// See [Fixture] for how to invoke it.
#[macro_export]
macro_rules! instantiate_blobstore_tests {
    ($target: ty) => {
        $crate::instantiate_blobstore_tests!($target, ());
    };
    ($target: ty, $tokio_test_args: tt) => {
        $crate::_instantiate_blobstore_tests!(@module create, $target, $tokio_test_args,
            test_whenCreatingBlob_thenItIsEmpty,
            test_whenCreatingTwoBlobs_thenTheyHaveDifferentIds,
            test_whenCreatingBlob_thenCanBeLoaded,
        );
        $crate::_instantiate_blobstore_tests!(@module try_create, $target, $tokio_test_args,
            test_givenNonexistingId_whenTryCreating_thenSucceedsWithThatId,
            test_givenExistingId_whenTryCreating_thenReturnsNoneAndKeepsData,
        );
        $crate::_instantiate_blobstore_tests!(@module load, $target, $tokio_test_args,
            test_givenEmptyBlobstore_whenLoadingNonexistingBlob_thenReturnsNone,
            test_givenNonEmptyBlobstore_whenLoadingNonexistingBlob_thenReturnsNone,
            test_givenWrittenBlob_whenLoading_thenHasSameData,
        );
        $crate::_instantiate_blobstore_tests!(@module remove_by_id, $target, $tokio_test_args,
            test_givenExistingBlob_whenRemoving_thenIsGone,
            test_givenNonexistingBlob_whenRemoving_thenReturnsNotRemoved,
            test_givenOtherBlobs_whenRemoving_thenOtherBlobsAreUnaffected,
        );
        $crate::_instantiate_blobstore_tests!(@module blob, $target, $tokio_test_args,
            test_whenRemovingBlob_thenAllItsNodesAreGone,
            test_whenResizing_thenDataIsKeptAndGrowthIsZero,
            test_whenReadingOutOfRange_thenReadFailsAndTryReadIsShort,
            test_allBlocks_areExactlyTheBlobsNodes,
        );
    };
}
