//! Helpers for tests in this and downstream crates.

mod asserts;
pub use asserts::assert_unordered_vec_eq;

mod data_fixture;
pub use data_fixture::DataFixture;
