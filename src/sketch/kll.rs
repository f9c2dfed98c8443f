//! KLL-style quantile sketch
//!
//! Values land in level 0. When a level holds `2k` items it is sorted and
//! every other item is promoted to the next level with doubled weight; the
//! rest are discarded. Accuracy depends on `k` only.

/// Compaction parameter used for every numeric column
pub const DEFAULT_K: usize = 256;

#[derive(Debug, Clone)]
pub struct KllSketch {
    levels: Vec<Vec<f64>>,
    k: usize,
    count: u64,
    compactions: usize,
    min: f64,
    max: f64,
}

impl KllSketch {
    pub fn new(k: usize) -> Self {
        let k = k.max(8);
        Self {
            levels: vec![Vec::with_capacity(2 * k)],
            k,
            count: 0,
            compactions: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add a value. NaN is ignored.
    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.count += 1;

        self.levels[0].push(value);
        if self.levels[0].len() >= 2 * self.k {
            self.compact(0);
        }
    }

    fn compact(&mut self, level: usize) {
        self.levels[level].sort_unstable_by(|a, b| a.total_cmp(b));

        // Alternate which half survives so the rounding bias cancels out
        let offset = (self.compactions + level) % 2;
        self.compactions = self.compactions.wrapping_add(1);

        let promoted: Vec<f64> = self.levels[level]
            .iter()
            .copied()
            .enumerate()
            .filter_map(|(i, v)| (i % 2 == offset).then_some(v))
            .collect();
        self.levels[level].clear();

        if level + 1 >= self.levels.len() {
            self.levels.push(Vec::with_capacity(2 * self.k));
        }
        self.levels[level + 1].extend(promoted);

        if self.levels[level + 1].len() >= 2 * self.k {
            self.compact(level + 1);
        }
    }

    /// Estimate the value at normalized rank `q` (clamped to [0, 1]).
    /// Returns `None` when the sketch is empty.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        let q = q.clamp(0.0, 1.0);
        if q == 0.0 {
            return Some(self.min);
        }
        if q == 1.0 {
            return Some(self.max);
        }

        let mut weighted: Vec<(f64, u64)> = self
            .levels
            .iter()
            .enumerate()
            .flat_map(|(level, items)| {
                let weight = 1u64.checked_shl(level as u32).unwrap_or(u64::MAX);
                items.iter().map(move |&v| (v, weight))
            })
            .collect();
        weighted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let total_weight = weighted
            .iter()
            .fold(0u64, |acc, &(_, w)| acc.saturating_add(w));
        let target = ((q * total_weight as f64).ceil() as u64).clamp(1, total_weight);

        let mut cumulative = 0u64;
        for &(value, weight) in &weighted {
            cumulative = cumulative.saturating_add(weight);
            if cumulative >= target {
                return Some(value);
            }
        }
        weighted.last().map(|&(v, _)| v)
    }

    /// Normalized rank error for this `k` (about 1% at k = 256)
    pub fn rank_error(&self) -> f64 {
        rank_error_for(self.k)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Number of items retained across all levels
    pub fn retained(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }

    pub fn memory_bytes(&self) -> usize {
        self.levels
            .iter()
            .map(|l| l.capacity() * std::mem::size_of::<f64>())
            .sum()
    }
}

impl Default for KllSketch {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

pub fn rank_error_for(k: usize) -> f64 {
    2.296 / (k as f64).powf(0.9723)
}
