use futures::{
    future,
    stream::{FuturesUnordered, Stream, StreamExt},
};
use std::fmt::Debug;
use std::future::Future;

/// Drives `stream` until it is exhausted, even after an item failed.
/// Returns the first error; any later errors are logged.
pub async fn run_to_completion<E: Debug>(
    stream: impl Stream<Item = Result<(), E>>,
) -> Result<(), E> {
    let mut errors = Box::pin(stream.filter_map(|result| future::ready(result.err())));
    let mut first_error = None;
    while let Some(error) = errors.next().await {
        if first_error.is_none() {
            first_error = Some(error);
        } else {
            log::error!("Swallowed additional error while processing stream: {:?}", error);
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Runs `func` concurrently for each item. Unlike `try_for_each_concurrent`, a failing item
/// doesn't cancel the others.
pub async fn for_each_unordered<T, E, F>(
    items: impl Iterator<Item = T>,
    func: impl Fn(T) -> F,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    E: Debug,
{
    let tasks: FuturesUnordered<_> = items.map(func).collect();
    run_to_completion(tasks).await
}
