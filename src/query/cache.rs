//! Cache of approximate query results for repeated queries
//!
//! Uses moka for thread-safe concurrent caching with TTL-based expiration.
//! Entries are keyed by engine generation, so a refit never serves answers
//! from a replaced engine.

use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::parser::ParsedQuery;
use super::result::QueryResult;

/// Cache key for query results
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    /// Engine generation the result was computed against
    generation: u64,
    /// Canonical query text
    query: String,
}

impl CacheKey {
    pub fn new(generation: u64, query: &ParsedQuery) -> Self {
        Self {
            generation,
            query: query.to_string(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Query cache with TTL and invalidation support
pub struct QueryCache {
    cache: Cache<CacheKey, QueryResult>,
    hits: AtomicU64,
    misses: AtomicU64,
    ttl: Duration,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_config(1000, Duration::from_secs(60))
    }

    pub fn with_config(max_entries: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            ttl,
        }
    }

    /// Get a cached result
    pub fn get(&self, generation: u64, query: &ParsedQuery) -> Option<QueryResult> {
        let key = CacheKey::new(generation, query);
        if let Some(result) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(result)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Store a successful result. Failures are cheap to recompute and are not cached.
    pub fn put(&self, generation: u64, query: &ParsedQuery, result: QueryResult) {
        if result.is_ok() {
            self.cache.insert(CacheKey::new(generation, query), result);
        }
    }

    /// Drop entries computed against any generation other than `current`
    pub fn retain_generation(&self, current: u64) {
        let stale: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.generation() != current)
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in stale {
            self.cache.invalidate(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.cache.entry_count(),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
    pub entry_count: u64,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::query::parse_query;
    use crate::query::result::{Answer, ErrorBound, QueryValue, SummaryKind};

    fn make_result(value: f64) -> QueryResult {
        QueryResult {
            query: "COUNT".into(),
            outcome: Ok(Answer {
                value: QueryValue::Scalar(value),
                error_bound: ErrorBound::Relative { fraction: 0.01 },
                summary: SummaryKind::HyperLogLog,
            }),
            explanation: String::new(),
            elapsed: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_cache_put_get() {
        let cache = QueryCache::new();
        let query = parse_query("COUNT DISTINCT category").unwrap();
        cache.put(1, &query, make_result(4.0));

        let cached = cache.get(1, &query).unwrap();
        assert_eq!(cached.value(), Some(&QueryValue::Scalar(4.0)));
    }

    #[test]
    fn test_cache_normalization() {
        let cache = QueryCache::new();
        cache.put(1, &parse_query("SUM amount GROUP BY category").unwrap(), make_result(3.0));

        // Same query with different whitespace and case should hit cache
        let variant = parse_query("  sum   AMOUNT group   by Category ").unwrap();
        assert!(cache.get(1, &variant).is_some());
    }

    #[test]
    fn test_cache_keyed_by_generation() {
        let cache = QueryCache::new();
        let query = parse_query("COUNT").unwrap();
        cache.put(1, &query, make_result(10.0));
        cache.put(2, &query, make_result(20.0));

        cache.retain_generation(2);
        assert!(cache.get(1, &query).is_none());
        assert_eq!(cache.get(2, &query).unwrap().value(), Some(&QueryValue::Scalar(20.0)));
    }

    #[test]
    fn test_failures_not_cached() {
        let cache = QueryCache::new();
        let query = parse_query("COUNT").unwrap();
        let mut failed = make_result(0.0);
        failed.outcome = Err(QueryError::Lookup("no sample".into()));
        cache.put(1, &query, failed);
        assert!(cache.get(1, &query).is_none());
    }

    #[test]
    fn test_cache_stats() {
        let cache = QueryCache::new();
        let query = parse_query("COUNT").unwrap();
        cache.put(1, &query, make_result(1.0));

        let _ = cache.get(1, &query);
        let _ = cache.get(1, &parse_query("MEDIAN amount").unwrap());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 0.01);
    }
}
