//! Explicit asynchronous cleanup.
//!
//! Stores in this workspace own other stores and need to flush or release them with
//! async calls. Rust has no async `Drop`, so those types are wrapped in an [AsyncDropGuard]
//! and callers must call [AsyncDropGuard::async_drop] before the value leaves scope.

mod async_drop;
pub use async_drop::AsyncDrop;

mod guard;
pub use guard::AsyncDropGuard;

mod with;
