use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Upstream lookup failed: {0}")]
    Upstream(String),

    #[error("Coalesced lookup failed: {0}")]
    Load(String),
}

/// Two-tier TTL cache for geocoding results
///
/// L1 is an in-process moka cache; its `try_get_with` population also
/// coalesces concurrent misses on the same key, so a cold key resolves to
/// exactly one upstream call per process. L2 is an optional shared redis
/// tier (`SETEX` with the same TTL) for multi-instance deployments.
/// Failed loads are never cached, so a missing address can be retried.
pub struct GeoCache {
    l1: moka::future::Cache<String, String>,
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    ttl_secs: u64,
}

impl GeoCache {
    /// Create a cache backed by redis (L2) plus the in-process tier
    pub async fn connect(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            l1: Self::build_l1(l1_size, ttl_secs),
            redis: Some(Arc::new(tokio::sync::Mutex::new(redis))),
            ttl_secs,
        })
    }

    /// In-process tier only; used in tests and when redis is unreachable
    pub fn in_memory(l1_size: u64, ttl_secs: u64) -> Self {
        Self {
            l1: Self::build_l1(l1_size, ttl_secs),
            redis: None,
            ttl_secs,
        }
    }

    fn build_l1(l1_size: u64, ttl_secs: u64) -> moka::future::Cache<String, String> {
        moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build()
    }

    /// Fetch a cached value, populating it from `load` on a full miss
    ///
    /// Concurrent callers on a cold key await a single load; an `Err` from
    /// the loader is returned to every waiter and nothing is cached.
    pub async fn get_or_load<F>(&self, key: &str, load: F) -> Result<String, CacheError>
    where
        F: Future<Output = Result<String, CacheError>>,
    {
        let redis = self.redis.clone();
        let ttl_secs = self.ttl_secs;
        let key_owned = key.to_string();

        self.l1
            .try_get_with(key_owned.clone(), async move {
                if let Some(redis) = &redis {
                    let mut conn = redis.lock().await;
                    match redis::cmd("GET")
                        .arg(&key_owned)
                        .query_async::<Option<String>>(&mut *conn)
                        .await
                    {
                        Ok(Some(value)) => {
                            tracing::trace!("L2 cache hit: {}", key_owned);
                            return Ok(value);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!("L2 cache read failed for {}: {}", key_owned, e);
                        }
                    }
                }

                tracing::trace!("Cache miss: {}", key_owned);
                let value = load.await?;

                if let Some(redis) = &redis {
                    let mut conn = redis.lock().await;
                    if let Err(e) = redis::cmd("SETEX")
                        .arg(&key_owned)
                        .arg(ttl_secs)
                        .arg(&value)
                        .query_async::<()>(&mut *conn)
                        .await
                    {
                        tracing::warn!("L2 cache write failed for {}: {}", key_owned, e);
                    }
                }

                Ok(value)
            })
            .await
            .map_err(|e: Arc<CacheError>| CacheError::Load(e.to_string()))
    }

    /// Number of entries currently resident in the in-process tier
    pub fn entry_count(&self) -> u64 {
        self.l1.entry_count()
    }

    /// Drop every entry from the in-process tier
    pub fn invalidate_all(&self) {
        self.l1.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_get_or_load_caches_success() {
        let cache = GeoCache::in_memory(100, 60);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load("k1", async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("value".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "value");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "loader should run once");
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache = GeoCache::in_memory(100, 60);
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_load("k1", async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(CacheError::Upstream("boom".to_string()))
            })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_load("k1", async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("recovered".to_string())
            })
            .await
            .unwrap();

        assert_eq!(second, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2, "error must not be cached");
    }

    #[tokio::test]
    async fn test_concurrent_cold_key_coalesces() {
        let cache = Arc::new(GeoCache::in_memory(100, 60));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load("cold", async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("shared".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "stampede must coalesce");
    }
}
