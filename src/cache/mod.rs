pub mod bucket;
pub mod keys;

pub use bucket::TimeBucketCache;
pub use keys::CacheKey;

use moka::future::Cache;
use std::time::Duration;

const STATS_CAPACITY: u64 = 10_000;
const SYMBOL_CAPACITY: u64 = 50_000;

/// Memoized provider lookups of one chain.
#[derive(Clone)]
pub struct ProviderCache {
    /// Normal and token transaction counts, bucketed by the stats TTL.
    pub tx_counts: TimeBucketCache<u64>,
    /// First transaction timestamps, bucketed by the stats TTL.
    pub first_tx: TimeBucketCache<Option<i64>>,
    /// Token symbols never change, so they are kept until evicted by size.
    pub symbols: Cache<CacheKey, Option<String>>,
}

impl ProviderCache {
    pub fn new(stats_ttl: Duration) -> Self {
        Self {
            tx_counts: TimeBucketCache::new(STATS_CAPACITY, stats_ttl),
            first_tx: TimeBucketCache::new(STATS_CAPACITY, stats_ttl),
            symbols: Cache::builder().max_capacity(SYMBOL_CAPACITY).build(),
        }
    }
}
