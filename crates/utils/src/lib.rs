//! Building blocks shared by the cryblocks crates.

pub mod async_drop;
pub mod data;
pub mod stream;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
