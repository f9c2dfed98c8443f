//! Count-Min sketch for per-key frequencies
//!
//! Point queries never under-estimate. With width `w` the over-estimate is
//! at most about `2/w` of the total count.

use std::hash::Hash;

#[derive(Clone)]
pub struct CountMinSketch {
    /// Row-major `depth x width` counters
    counters: Vec<u64>,
    width: usize,
    depth: usize,
    total: u64,
}

impl CountMinSketch {
    pub fn new(width: usize, depth: usize) -> Self {
        let width = width.max(1);
        let depth = depth.max(1);
        Self {
            counters: vec![0; width * depth],
            width,
            depth,
            total: 0,
        }
    }

    /// Size from a relative error: `w = max(10, ceil(2/eps))`, `d = max(5, ceil(log2(1/eps)))`
    pub fn from_error(epsilon: f64) -> Self {
        let (width, depth) = dimensions_for(epsilon);
        Self::new(width, depth)
    }

    pub fn add<T: Hash + ?Sized>(&mut self, key: &T) {
        self.increment(key, 1);
    }

    pub fn increment<T: Hash + ?Sized>(&mut self, key: &T, count: u64) {
        let (h1, h2) = super::hash_pair(key);
        for row in 0..self.depth {
            let idx = self.index(h1, h2, row);
            self.counters[idx] = self.counters[idx].saturating_add(count);
        }
        self.total = self.total.saturating_add(count);
    }

    /// Minimum across the key's counters
    pub fn estimate<T: Hash + ?Sized>(&self, key: &T) -> u64 {
        let (h1, h2) = super::hash_pair(key);
        (0..self.depth)
            .map(|row| self.counters[self.index(h1, h2, row)])
            .min()
            .unwrap_or(0)
    }

    /// Additive error bound as a fraction of the total count
    pub fn error_fraction(&self) -> f64 {
        2.0 / self.width as f64
    }

    /// Additive error bound in items
    pub fn error_bound(&self) -> f64 {
        self.error_fraction() * self.total as f64
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn memory_bytes(&self) -> usize {
        self.counters.len() * std::mem::size_of::<u64>()
    }

    // Bucket for `row` using double hashing, offset into that row
    fn index(&self, h1: u64, h2: u64, row: usize) -> usize {
        let hash = h1.wrapping_add((row as u64).wrapping_mul(h2));
        row * self.width + (hash % self.width as u64) as usize
    }
}

pub fn dimensions_for(epsilon: f64) -> (usize, usize) {
    let width = ((2.0 / epsilon).ceil() as usize).max(10);
    let depth = ((1.0 / epsilon).log2().ceil() as usize).max(5);
    (width, depth)
}

impl std::fmt::Debug for CountMinSketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountMinSketch")
            .field("width", &self.width)
            .field("depth", &self.depth)
            .field("total", &self.total)
            .field("memory_bytes", &self.memory_bytes())
            .finish()
    }
}
