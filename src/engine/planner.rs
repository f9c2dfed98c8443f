//! Parameter planner: one relative-error knob drives every summary size.

use crate::error::ConfigError;
use crate::sampling::reservoir_size;
use crate::sketch::count_min::dimensions_for;
use crate::sketch::hll::{MAX_PRECISION, MIN_PRECISION};
use crate::sketch::kll::DEFAULT_K;
use serde::Serialize;

/// Accepted relative error range
pub const MIN_TOLERANCE: f64 = 0.001;
pub const MAX_TOLERANCE: f64 = 0.10;

/// Lower bound on the sampling fraction
pub const MIN_SAMPLE_FRACTION: f64 = 0.001;

/// Safety margin over the `1/eps^2` minimum sample size
const SAMPLE_SIZE_FACTOR: f64 = 1.5;

/// A validated relative error in [0.001, 0.10]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct ErrorTolerance(f64);

impl ErrorTolerance {
    pub fn new(epsilon: f64) -> Result<Self, ConfigError> {
        if !(MIN_TOLERANCE..=MAX_TOLERANCE).contains(&epsilon) {
            return Err(ConfigError::ErrorToleranceOutOfRange(epsilon));
        }
        Ok(Self(epsilon))
    }

    /// From a user-facing percentage in [0.1, 10]
    pub fn from_percent(percent: f64) -> Result<Self, ConfigError> {
        Self::new(percent / 100.0)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn percent(&self) -> f64 {
        self.0 * 100.0
    }
}

/// Every size derived for one fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SketchParams {
    pub hll_p: u32,
    pub sample_fraction: f64,
    pub cms_width: usize,
    pub cms_depth: usize,
    pub reservoir_size: usize,
    pub kll_k: usize,
}

impl SketchParams {
    /// Parameters supplied directly instead of planned. Sizes that only the
    /// planner derives (Count-Min, reservoir) use `epsilon`.
    pub fn fixed(
        hll_p: u32,
        sample_fraction: f64,
        epsilon: f64,
        total_rows: usize,
    ) -> Result<Self, ConfigError> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&hll_p) {
            return Err(ConfigError::InvalidParameter(format!(
                "hll precision {} is outside [{}, {}]",
                hll_p, MIN_PRECISION, MAX_PRECISION
            )));
        }
        if !(sample_fraction > 0.0 && sample_fraction <= 1.0) {
            return Err(ConfigError::InvalidParameter(format!(
                "sample fraction {} is outside (0, 1]",
                sample_fraction
            )));
        }

        let (cms_width, cms_depth) = dimensions_for(epsilon);
        Ok(Self {
            hll_p,
            sample_fraction,
            cms_width,
            cms_depth,
            reservoir_size: reservoir_size(total_rows, epsilon),
            kll_k: DEFAULT_K,
        })
    }
}

/// `hll_p = clamp(ceil(log2((1.04/eps)^2)), 4, 18)`
pub fn hll_precision(epsilon: f64) -> u32 {
    let p = (1.04 / epsilon).powi(2).log2().ceil();
    (p as i64).clamp(MIN_PRECISION as i64, MAX_PRECISION as i64) as u32
}

/// `clamp(1.5 / eps^2 / total_rows, 0.001, 1.0)`
pub fn sample_fraction(epsilon: f64, total_rows: usize) -> f64 {
    let required = SAMPLE_SIZE_FACTOR / (epsilon * epsilon);
    (required / total_rows as f64).clamp(MIN_SAMPLE_FRACTION, 1.0)
}

/// Derive all summary sizes from a tolerance and the dataset size
pub fn plan_parameters(
    tolerance: ErrorTolerance,
    total_rows: usize,
) -> Result<SketchParams, ConfigError> {
    if total_rows == 0 {
        return Err(ConfigError::EmptyDataset);
    }

    let epsilon = tolerance.value();
    let (cms_width, cms_depth) = dimensions_for(epsilon);

    Ok(SketchParams {
        hll_p: hll_precision(epsilon),
        sample_fraction: sample_fraction(epsilon, total_rows),
        cms_width,
        cms_depth,
        reservoir_size: reservoir_size(total_rows, epsilon),
        kll_k: DEFAULT_K,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_known_values() {
        let params = plan_parameters(ErrorTolerance::new(0.01).unwrap(), 10_000).unwrap();
        assert_eq!(params.hll_p, 14);
        assert_eq!(params.sample_fraction, 1.0);
        assert_eq!((params.cms_width, params.cms_depth), (200, 7));
        assert_eq!(params.reservoir_size, 9_900);
        assert_eq!(params.kll_k, 256);

        let params = plan_parameters(ErrorTolerance::new(0.05).unwrap(), 1_000_000).unwrap();
        assert_eq!(params.hll_p, 9);
        assert!((params.sample_fraction - 0.0006_f64.max(0.001)).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_hold_for_all_inputs() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10_000 {
            let epsilon = rng.gen_range(MIN_TOLERANCE..=MAX_TOLERANCE);
            let rows = rng.gen_range(1..=100_000_000usize);
            let params = plan_parameters(ErrorTolerance::new(epsilon).unwrap(), rows).unwrap();
            assert!((4..=18).contains(&params.hll_p));
            assert!((0.001..=1.0).contains(&params.sample_fraction));
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(
            ErrorTolerance::new(0.2),
            Err(ConfigError::ErrorToleranceOutOfRange(0.2))
        );
        assert!(ErrorTolerance::from_percent(0.05).is_err());
        assert!(ErrorTolerance::from_percent(10.0).is_ok());
        assert_eq!(
            plan_parameters(ErrorTolerance::new(0.01).unwrap(), 0),
            Err(ConfigError::EmptyDataset)
        );
    }

    #[test]
    fn test_precision_clamps() {
        assert_eq!(hll_precision(0.001), 18);
        assert_eq!(hll_precision(0.10), 7);
        assert_eq!(hll_precision(0.5), 4);
    }

    #[test]
    fn test_fixed_params() {
        let params = SketchParams::fixed(12, 0.1, 0.01, 1_000).unwrap();
        assert_eq!(params.hll_p, 12);
        assert_eq!(params.sample_fraction, 0.1);
        assert!(SketchParams::fixed(3, 0.1, 0.01, 1_000).is_err());
        assert!(SketchParams::fixed(12, 0.0, 0.01, 1_000).is_err());
        assert!(SketchParams::fixed(12, 1.5, 0.01, 1_000).is_err());
    }
}
