use async_trait::async_trait;
use std::fmt::Debug;

/// Async cleanup behavior for a type that lives inside an [AsyncDropGuard](super::AsyncDropGuard).
///
/// [AsyncDrop::async_drop_impl] runs when the guard's `async_drop` is called. If the type
/// also implements [Drop], that runs afterwards, even if `async_drop_impl` returned an error.
#[async_trait]
pub trait AsyncDrop {
    type Error: Debug;

    async fn async_drop_impl(&mut self) -> Result<(), Self::Error>;
}
