mod encrypted;
pub use encrypted::{EncryptedBlockStore, IntegrityError};

#[cfg(any(test, feature = "testutils"))]
mod failing;
#[cfg(any(test, feature = "testutils"))]
pub use failing::{FailingBlockStore, InjectedWriteFailure};

mod inmemory;
pub use inmemory::InMemoryBlockStore;

mod ondisk;
pub use ondisk::OnDiskBlockStore;
