/// Read-through caching over [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. On a miss, or when the cache itself
/// cannot be read, awaits `$block`, queues the result for a background write
/// with `$ttl` seconds to live, and returns it. A cache outage therefore costs
/// latency, never availability; errors from `$block` still propagate with `?`.
///
/// ```rust,ignore
/// let vector: Vec<f32> = cached!(self.cache, key, ttl, async move {
///     inner.embed(text).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            Ok(Some(cached)) => Ok(cached),
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(error = %e, key = %$key, "Cache read failed, computing value");
                }
                let value = $block.await?;
                $cache.set_in_background(&$key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
