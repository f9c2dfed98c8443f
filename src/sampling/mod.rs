//! Representative row subsets built at fit time.
//!
//! Every [`SampleTable`] carries the fraction it represents; COUNT and SUM
//! computed on it are divided by that fraction to extrapolate. Stratified
//! tables instead weight each row by the inverse of its stratum's inclusion
//! fraction.

pub mod reservoir;
pub mod strategies;

pub use reservoir::{reservoir_sample, reservoir_size};
pub use strategies::{bernoulli_indices, build_sample, stratified_draws, ADAPTIVE_FRACTIONS};

use crate::data::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    Random,
    Stratified,
    Reservoir,
    Adaptive,
}

impl SamplingStrategy {
    pub const ALL: [SamplingStrategy; 4] = [
        SamplingStrategy::Random,
        SamplingStrategy::Stratified,
        SamplingStrategy::Reservoir,
        SamplingStrategy::Adaptive,
    ];

    /// Short rationale used in query explanations
    pub fn rationale(&self) -> &'static str {
        match self {
            SamplingStrategy::Random => "uniform random rows, fast with no per-group guarantee",
            SamplingStrategy::Stratified => {
                "rows drawn within every group so each observed group is represented"
            }
            SamplingStrategy::Reservoir => "fixed-size uniform sample taken in a single pass",
            SamplingStrategy::Adaptive => {
                "two samples at different fractions compared for self-consistency"
            }
        }
    }
}

impl fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingStrategy::Random => write!(f, "random"),
            SamplingStrategy::Stratified => write!(f, "stratified"),
            SamplingStrategy::Reservoir => write!(f, "reservoir"),
            SamplingStrategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl FromStr for SamplingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(SamplingStrategy::Random),
            "stratified" => Ok(SamplingStrategy::Stratified),
            "reservoir" => Ok(SamplingStrategy::Reservoir),
            "adaptive" => Ok(SamplingStrategy::Adaptive),
            other => Err(format!("unknown sampling strategy '{}'", other)),
        }
    }
}

/// A materialized row subset plus the fraction of the population it stands for
#[derive(Debug, Clone)]
pub struct SampleTable {
    strategy: SamplingStrategy,
    rows: Dataset,
    fraction: f64,
    /// Population rows each sample row stands for, when not uniform
    weights: Option<Vec<f64>>,
}

impl SampleTable {
    pub fn new(strategy: SamplingStrategy, rows: Dataset, fraction: f64) -> Self {
        Self {
            strategy,
            rows,
            fraction,
            weights: None,
        }
    }

    /// A table with one weight per row; `fraction` is only reported
    pub fn weighted(
        strategy: SamplingStrategy,
        rows: Dataset,
        fraction: f64,
        weights: Vec<f64>,
    ) -> Self {
        Self {
            strategy,
            rows,
            fraction,
            weights: Some(weights),
        }
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn strategy(&self) -> SamplingStrategy {
        self.strategy
    }

    pub fn rows(&self) -> &Dataset {
        &self.rows
    }

    /// Realized sampling fraction used for extrapolation
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn len(&self) -> usize {
        self.rows.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What one strategy produced at fit time
#[derive(Debug, Clone)]
pub enum Sample {
    Single(SampleTable),
    /// Two independent draws; `coarse` answers, `fine` is the consistency check
    Adaptive {
        coarse: SampleTable,
        fine: SampleTable,
    },
}

impl Sample {
    /// The table whose results are reported
    pub fn table(&self) -> &SampleTable {
        match self {
            Sample::Single(table) => table,
            Sample::Adaptive { coarse, .. } => coarse,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Sample::Single(table) => table.len(),
            Sample::Adaptive { coarse, fine } => coarse.len() + fine.len(),
        }
    }

    pub fn memory_usage(&self) -> usize {
        match self {
            Sample::Single(table) => table.rows().memory_usage(),
            Sample::Adaptive { coarse, fine } => {
                coarse.rows().memory_usage() + fine.rows().memory_usage()
            }
        }
    }
}

/// All samples built for one engine. The first configured strategy is primary.
#[derive(Debug, Clone)]
pub struct SampleSet {
    samples: BTreeMap<SamplingStrategy, Sample>,
    primary: SamplingStrategy,
}

impl SampleSet {
    pub fn new(primary: SamplingStrategy, samples: BTreeMap<SamplingStrategy, Sample>) -> Self {
        Self { samples, primary }
    }

    pub fn primary(&self) -> SamplingStrategy {
        self.primary
    }

    pub fn get(&self, strategy: SamplingStrategy) -> Option<&Sample> {
        self.samples.get(&strategy)
    }

    pub fn contains(&self, strategy: SamplingStrategy) -> bool {
        self.samples.contains_key(&strategy)
    }

    pub fn strategies(&self) -> impl Iterator<Item = SamplingStrategy> + '_ {
        self.samples.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SamplingStrategy, &Sample)> {
        self.samples.iter().map(|(s, sample)| (*s, sample))
    }

    pub fn memory_usage(&self) -> usize {
        self.samples.values().map(|s| s.memory_usage()).sum()
    }
}
