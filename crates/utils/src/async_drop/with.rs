/// Runs `$f` with access to the guarded `$value` and async drops it afterwards, whether `$f`
/// succeeded or not. If the cleanup fails, its error is returned instead of the result of `$f`.
///
/// ```ignore
/// let result = with_async_drop!(blobstore, { check(&blobstore).await });
/// ```
#[macro_export]
macro_rules! with_async_drop {
    ($value:ident, $f:block) => {
        async {
            let result = async { $f }.await;
            let mut value = $value;
            value.async_drop().await?;
            result
        }
        .await
    };
}
