//! Fixed-memory summaries built once at fit time and read by the query router.
//!
//! - [`HyperLogLog`] answers COUNT DISTINCT
//! - [`KllSketch`] answers MEDIAN / QUANTILE
//! - [`CountMinSketch`] answers per-key counts for GROUPBY

pub mod count_min;
pub mod hll;
pub mod kll;

pub use count_min::CountMinSketch;
pub use hll::HyperLogLog;
pub use kll::KllSketch;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Salt mixed into the second hash of a pair
const SECOND_HASH_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Full-width 64-bit hash of the value's bytes. `DefaultHasher::new` uses
/// fixed keys, so sketches built from the same data agree across runs.
pub(crate) fn hash64<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// Compute two independent hashes for double hashing: h(i) = h1 + i*h2
pub(crate) fn hash_pair<T: Hash + ?Sized>(value: &T) -> (u64, u64) {
    let h1 = hash64(value);

    let mut hasher = DefaultHasher::new();
    SECOND_HASH_SALT.hash(&mut hasher);
    value.hash(&mut hasher);
    // Odd h2 keeps successive probes distinct
    let h2 = hasher.finish() | 1;

    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash64("category"), hash64("category"));
        assert_ne!(hash64("A"), hash64("B"));
    }

    #[test]
    fn test_no_collisions_on_sequential_string_keys() {
        let hashes: std::collections::HashSet<u64> =
            (0..1_000_000).map(|i| hash64(&format!("user-{}", i))).collect();
        assert_eq!(hashes.len(), 1_000_000);
    }

    #[test]
    fn test_hash_pair_second_is_odd() {
        for key in ["a", "b", "c", "longer key"] {
            let (_, h2) = hash_pair(key);
            assert_eq!(h2 % 2, 1);
        }
    }
}
