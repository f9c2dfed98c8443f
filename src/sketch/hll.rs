//! HyperLogLog cardinality estimator
//!
//! Each value is hashed once; the top `p` bits pick a register and the
//! register keeps the longest run of leading zeros seen in the rest.

use std::hash::Hash;

/// Smallest and largest supported precision
pub const MIN_PRECISION: u32 = 4;
pub const MAX_PRECISION: u32 = 18;

/// Approximate distinct counter with `2^p` one-byte registers.
#[derive(Clone)]
pub struct HyperLogLog {
    registers: Vec<u8>,
    precision: u32,
    /// Number of values added (not distinct)
    count: u64,
}

impl HyperLogLog {
    /// Create a sketch with `2^precision` registers. Precision is clamped to [4, 18].
    pub fn new(precision: u32) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
        Self {
            registers: vec![0; 1 << precision],
            precision,
            count: 0,
        }
    }

    pub fn add<T: Hash + ?Sized>(&mut self, value: &T) {
        let hash = super::hash64(value);
        let bucket = (hash >> (64 - self.precision)) as usize;

        // Leading zeros of the remaining bits, capped at their width
        let shifted = hash << self.precision;
        let max_leading_zeros = 64 - self.precision;
        let rho = shifted.leading_zeros().min(max_leading_zeros) as u8 + 1;

        if rho > self.registers[bucket] {
            self.registers[bucket] = rho;
        }
        self.count += 1;
    }

    pub fn add_str(&mut self, value: &str) {
        self.add(value);
    }

    /// Bias-corrected cardinality estimate
    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;

        let indicator_sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2.0_f64.powi(-(r as i32)))
            .sum();

        let alpha = match self.precision {
            4 => 0.673,
            5 => 0.697,
            6 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };

        let raw_estimate = alpha * m * m / indicator_sum;

        // Linear counting for the small range. With a 64-bit hash no
        // large-range correction is needed.
        if raw_estimate <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count() as f64;
            if zeros > 0.0 {
                return m * (m / zeros).ln();
            }
        }
        raw_estimate
    }

    /// Expected relative standard error, `1.04 / sqrt(2^p)`
    pub fn relative_error(&self) -> f64 {
        relative_error_for(self.precision)
    }

    /// One-standard-error upper bound on the estimate
    pub fn upper_bound(&self) -> f64 {
        self.estimate() * (1.0 + self.relative_error())
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.registers.len()
    }

}

pub fn relative_error_for(precision: u32) -> f64 {
    1.04 / ((1u64 << precision) as f64).sqrt()
}

impl std::fmt::Debug for HyperLogLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperLogLog")
            .field("precision", &self.precision)
            .field("count", &self.count)
            .field("memory_bytes", &self.memory_bytes())
            .finish()
    }
}
