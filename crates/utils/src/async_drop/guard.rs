use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

use super::AsyncDrop;

/// Owns a value that must be cleaned up with [AsyncDropGuard::async_drop].
///
/// Letting the guard go out of scope without calling [AsyncDropGuard::async_drop] is a bug
/// and panics. Types meant to live in a guard should only hand out instances already
/// wrapped in one, usually straight from their constructor.
#[derive(Debug)]
pub struct AsyncDropGuard<T: Debug>(Option<T>);

impl<T: Debug> AsyncDropGuard<T> {
    pub fn new(v: T) -> Self {
        Self(Some(v))
    }

    /// Take the value out of the guard without running its async cleanup.
    /// The caller becomes responsible for cleaning it up.
    pub fn unsafe_into_inner_dont_drop(mut self) -> T {
        self.0
            .take()
            .expect("AsyncDropGuard was already dropped")
    }
}

impl<T: Debug + AsyncDrop> AsyncDropGuard<T> {
    /// Run the async cleanup of the contained value. After this, the guard is empty
    /// and may be dropped; accessing the value panics.
    pub async fn async_drop(&mut self) -> Result<(), T::Error> {
        let mut value = self
            .0
            .take()
            .expect("AsyncDropGuard was already dropped");
        value.async_drop_impl().await
    }
}

impl<T: Debug> Drop for AsyncDropGuard<T> {
    fn drop(&mut self) {
        if let Some(v) = &self.0 {
            if std::thread::panicking() {
                // A second panic would abort and hide the original failure, usually a failing test.
                log::error!("Forgot to call async_drop on {:?}", v);
            } else {
                panic!("Forgot to call async_drop on {:?}", v);
            }
        }
    }
}

impl<T: Debug> Deref for AsyncDropGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.0
            .as_ref()
            .expect("AsyncDropGuard was already dropped")
    }
}

impl<T: Debug> DerefMut for AsyncDropGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0
            .as_mut()
            .expect("AsyncDropGuard was already dropped")
    }
}
