/// Read-through caching around an async computation.
///
/// Returns the cached value for `$key` when present. Otherwise awaits
/// `$block`, queues the result for writing and returns it. A failed cache
/// read is logged and treated as a miss; errors from `$block` propagate
/// with `?`, so the macro must be the tail of a function returning
/// `AppResult`.
///
/// # Example
/// ```rust,ignore
/// async fn trending_cached(cache: &Cache, key: CacheKey) -> AppResult<Vec<TargetEntity>> {
///     cached!(cache, key, async { load_trending().await })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => Ok(cached),
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(error = %e, key = %$key, "Cache read failed, using store");
                }
                let value = $block.await?;
                $cache.set_in_background(&$key, &value);
                Ok(value)
            }
        }
    }};
}
