//! Storage of fixed-size opaque blocks addressed by random [BlockId]s.
//!
//! [InMemoryBlockStore] and [OnDiskBlockStore] hold raw blocks, [EncryptedBlockStore]
//! wraps any other store and authenticates and encrypts every block on its way through.

mod block_id;
pub use block_id::{BlockId, BLOCKID_LEN};

mod utils;
pub use utils::{RemoveResult, TryCreateResult};

mod overhead;
pub use overhead::{InvalidBlockSizeError, Overhead};

mod low_level;
pub use low_level::{
    BlockStore, BlockStoreDeleter, BlockStoreReader, BlockStoreWriter, EncryptedBlockStore,
    InMemoryBlockStore, IntegrityError, OnDiskBlockStore,
};
#[cfg(any(test, feature = "testutils"))]
pub use low_level::{FailingBlockStore, InjectedWriteFailure};

#[cfg(any(test, feature = "testutils"))]
pub mod tests;

// byte_unit uses u128 if its `u128` feature gets enabled somewhere in the dependency graph.
// We rely on it being u64.
static_assertions::const_assert_eq!(
    std::mem::size_of::<u64>(),
    std::mem::size_of::<byte_unit::Byte>()
);
