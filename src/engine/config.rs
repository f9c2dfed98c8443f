use crate::sampling::SamplingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How GROUPBY row counts are answered by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupCountTechnique {
    /// Count-Min sketch over the dimension column
    CountMin,
    /// Extrapolated counts from a sample table
    Sample,
}

impl fmt::Display for GroupCountTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupCountTechnique::CountMin => write!(f, "countmin"),
            GroupCountTechnique::Sample => write!(f, "sample"),
        }
    }
}

impl FromStr for GroupCountTechnique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "countmin" | "count-min" | "cms" => Ok(GroupCountTechnique::CountMin),
            "sample" | "sampling" => Ok(GroupCountTechnique::Sample),
            other => Err(format!("unknown group count technique '{}'", other)),
        }
    }
}

/// Configuration for fitting an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// User-facing error tolerance in percent, [0.1, 10.0] (default: 1.0)
    pub error_tolerance_percent: f64,
    /// Sample tables to build; the first is the primary (default: stratified)
    pub sample_strategies: Vec<SamplingStrategy>,
    /// Default technique for GROUPBY counts (default: Count-Min)
    pub group_count_technique: GroupCountTechnique,
    /// Seed for reproducible sampling; entropy-seeded when unset
    pub seed: Option<u64>,
    /// Build summaries on the rayon pool (default: true)
    pub parallel_build: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_tolerance_percent: 1.0,
            sample_strategies: vec![SamplingStrategy::Stratified],
            group_count_technique: GroupCountTechnique::CountMin,
            seed: None,
            parallel_build: true,
        }
    }
}

impl EngineConfig {
    pub fn new(error_tolerance_percent: f64) -> Self {
        Self {
            error_tolerance_percent,
            ..Default::default()
        }
    }

    pub fn with_tolerance_percent(mut self, percent: f64) -> Self {
        self.error_tolerance_percent = percent;
        self
    }

    /// Duplicates are dropped, keeping first occurrence
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = SamplingStrategy>) -> Self {
        let mut unique = Vec::new();
        for strategy in strategies {
            if !unique.contains(&strategy) {
                unique.push(strategy);
            }
        }
        self.sample_strategies = unique;
        self
    }

    /// Build every sampling strategy, keeping the current primary first
    pub fn with_all_strategies(self) -> Self {
        let primary = self
            .sample_strategies
            .first()
            .copied()
            .unwrap_or(SamplingStrategy::Stratified);
        self.with_strategies(std::iter::once(primary).chain(SamplingStrategy::ALL))
    }

    pub fn with_group_count_technique(mut self, technique: GroupCountTechnique) -> Self {
        self.group_count_technique = technique;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallel_build(mut self, parallel: bool) -> Self {
        self.parallel_build = parallel;
        self
    }

    pub fn primary_strategy(&self) -> SamplingStrategy {
        self.sample_strategies
            .first()
            .copied()
            .unwrap_or(SamplingStrategy::Stratified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.error_tolerance_percent, 1.0);
        assert_eq!(config.primary_strategy(), SamplingStrategy::Stratified);
        assert_eq!(config.group_count_technique, GroupCountTechnique::CountMin);
        assert!(config.parallel_build);
    }

    #[test]
    fn test_all_strategies_keeps_primary_first() {
        let config = EngineConfig::default()
            .with_strategies([SamplingStrategy::Reservoir])
            .with_all_strategies();
        assert_eq!(config.sample_strategies.len(), 4);
        assert_eq!(config.primary_strategy(), SamplingStrategy::Reservoir);
    }

    #[test]
    fn test_technique_parse() {
        assert_eq!(
            "CountMin".parse::<GroupCountTechnique>(),
            Ok(GroupCountTechnique::CountMin)
        );
        assert_eq!(
            "sample".parse::<GroupCountTechnique>(),
            Ok(GroupCountTechnique::Sample)
        );
        assert!("median".parse::<GroupCountTechnique>().is_err());
    }
}
