//! Time-bucketed memoization using Moka

use super::keys::CacheKey;
use crate::blockchain::provider::ProviderError;
use moka::future::Cache;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Memoizes query results per `(key, floor(now / ttl))`. A value is reused
/// until the clock enters the next bucket; stale buckets age out through the
/// cache's own time-to-live. Failed lookups are never stored.
#[derive(Clone)]
pub struct TimeBucketCache<V> {
    cache: Cache<(CacheKey, u64), V>,
    ttl: Duration,
}

impl<V> TimeBucketCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl.max(Duration::from_secs(1)))
            .build();

        Self { cache, ttl }
    }

    /// Bucket index for a unix timestamp in seconds
    pub fn bucket_at(&self, now_secs: u64) -> u64 {
        now_secs / self.ttl.as_secs().max(1)
    }

    fn current_bucket(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.bucket_at(now)
    }

    /// Return the memoized value for `key` in the current bucket, running
    /// `init` on a miss
    pub async fn get_or_try_insert<Fut>(&self, key: CacheKey, init: Fut) -> Result<V, ProviderError>
    where
        Fut: Future<Output = Result<V, ProviderError>>,
    {
        self.get_or_try_insert_in(key, self.current_bucket(), init).await
    }

    pub async fn get_or_try_insert_in<Fut>(
        &self,
        key: CacheKey,
        bucket: u64,
        init: Fut,
    ) -> Result<V, ProviderError>
    where
        Fut: Future<Output = Result<V, ProviderError>>,
    {
        debug!("Cache lookup for key: {} (bucket {})", key, bucket);
        self.cache
            .try_get_with((key, bucket), init)
            .await
            .map_err(|err| (*err).clone())
    }
}
