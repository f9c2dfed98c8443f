//! The immutable engine snapshot: every summary built for one fit.

pub mod config;
pub mod handle;
pub mod planner;

pub use config::{EngineConfig, GroupCountTechnique};
pub use handle::{EngineHandle, EngineState, Snapshot};
pub use planner::{plan_parameters, ErrorTolerance, SketchParams};

use crate::data::{ColumnConfig, DataType, Dataset};
use crate::error::{ConfigError, QueryError};
use crate::query::router::{self, Routed};
use crate::query::{parse_query, Answer, QueryResult};
use crate::sampling::strategies::SamplePlan;
use crate::sampling::{build_sample, SampleSet, SamplingStrategy};
use crate::sketch::{CountMinSketch, HyperLogLog, KllSketch};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Count-Min sketch over a dimension column plus the keys seen at fit time
#[derive(Debug, Clone)]
pub struct FrequencySummary {
    pub sketch: CountMinSketch,
    pub keys: BTreeSet<String>,
}

/// Built once by [`Engine::fit`] and never mutated afterwards.
#[derive(Debug)]
pub struct Engine {
    columns: ColumnConfig,
    config: EngineConfig,
    tolerance: ErrorTolerance,
    params: SketchParams,
    schema: BTreeMap<String, DataType>,
    total_rows: usize,
    cardinality: HashMap<String, HyperLogLog>,
    quantiles: HashMap<String, KllSketch>,
    frequencies: HashMap<String, FrequencySummary>,
    samples: SampleSet,
    fitted_at: DateTime<Utc>,
    fit_duration: Duration,
}

/// Fit an engine from a user-facing error tolerance percentage
pub fn fit(
    dataset: &Dataset,
    columns: ColumnConfig,
    error_tolerance_percent: f64,
) -> Result<Engine, ConfigError> {
    Engine::fit(dataset, columns, EngineConfig::new(error_tolerance_percent))
}

/// Answer a query; never fails, errors are part of the result
pub fn query(engine: &Engine, text: &str) -> QueryResult {
    engine.query(text)
}

impl Engine {
    /// Validate, plan parameters from the error tolerance, then build every summary
    pub fn fit(
        dataset: &Dataset,
        columns: ColumnConfig,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let tolerance = validate(dataset, &columns, &config)?;
        let params = plan_parameters(tolerance, dataset.row_count())?;
        Ok(Self::build(dataset, columns, config, tolerance, params))
    }

    /// Fit with explicitly supplied parameters, skipping the planner
    pub fn fit_with_params(
        dataset: &Dataset,
        columns: ColumnConfig,
        config: EngineConfig,
        params: SketchParams,
    ) -> Result<Self, ConfigError> {
        let tolerance = validate(dataset, &columns, &config)?;
        let params = SketchParams::fixed(
            params.hll_p,
            params.sample_fraction,
            tolerance.value(),
            dataset.row_count(),
        )?;
        Ok(Self::build(dataset, columns, config, tolerance, params))
    }

    fn build(
        dataset: &Dataset,
        columns: ColumnConfig,
        config: EngineConfig,
        tolerance: ErrorTolerance,
        params: SketchParams,
    ) -> Self {
        let start = Instant::now();
        tracing::info!(
            rows = dataset.row_count(),
            error_tolerance = tolerance.value(),
            hll_p = params.hll_p,
            sample_fraction = params.sample_fraction,
            "Fitting engine"
        );

        let parallel = config.parallel_build;
        let plan = SamplePlan {
            fraction: params.sample_fraction,
            reservoir_size: params.reservoir_size,
            seed: config.seed,
        };

        let build_sketches = || {
            join(
                parallel,
                || build_cardinality(dataset, &columns.distinct_cols, params.hll_p, parallel),
                || build_quantiles(dataset, &columns.numeric_cols, params.kll_k, parallel),
            )
        };
        let build_rest = || {
            join(
                parallel,
                || build_frequencies(dataset, &columns.dim_cols, &params, parallel),
                || build_samples(dataset, &columns.dim_cols, &config.sample_strategies, &plan, parallel),
            )
        };
        let ((cardinality, quantiles), (frequencies, samples)) =
            join(parallel, build_sketches, build_rest);

        let samples = SampleSet::new(config.primary_strategy(), samples);
        let fit_duration = start.elapsed();

        tracing::info!(
            cardinality_sketches = cardinality.len(),
            quantile_sketches = quantiles.len(),
            frequency_sketches = frequencies.len(),
            sample_tables = config.sample_strategies.len(),
            duration_ms = fit_duration.as_millis() as u64,
            "Engine fitted"
        );

        Self {
            schema: dataset.schema().clone(),
            total_rows: dataset.row_count(),
            columns,
            config,
            tolerance,
            params,
            cardinality,
            quantiles,
            frequencies,
            samples,
            fitted_at: Utc::now(),
            fit_duration,
        }
    }

    /// Parse, route and compute. Timing covers all three.
    pub fn query(&self, text: &str) -> QueryResult {
        let start = Instant::now();
        let routed = parse_query(text)
            .map_err(QueryError::from)
            .and_then(|parsed| router::route(self, &parsed));
        let elapsed = start.elapsed();

        match routed {
            Ok(Routed {
                answer,
                explanation,
            }) => {
                tracing::debug!(query = text, elapsed_us = elapsed.as_micros() as u64, "Query answered");
                QueryResult {
                    query: text.trim().to_string(),
                    outcome: Ok(answer),
                    explanation,
                    elapsed,
                }
            }
            Err(err) => {
                tracing::debug!(query = text, error = %err, "Query rejected");
                QueryResult {
                    query: text.trim().to_string(),
                    explanation: router::explain_error(&err),
                    outcome: Err(err),
                    elapsed,
                }
            }
        }
    }

    /// Like [`Engine::query`] but returns only the answer or error
    pub fn try_query(&self, text: &str) -> Result<Answer, QueryError> {
        self.query(text).outcome
    }

    pub fn columns(&self) -> &ColumnConfig {
        &self.columns
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tolerance(&self) -> ErrorTolerance {
        self.tolerance
    }

    pub fn params(&self) -> &SketchParams {
        &self.params
    }

    pub fn schema(&self) -> &BTreeMap<String, DataType> {
        &self.schema
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn cardinality_sketch(&self, column: &str) -> Option<&HyperLogLog> {
        self.cardinality.get(column)
    }

    pub fn quantile_sketch(&self, column: &str) -> Option<&KllSketch> {
        self.quantiles.get(column)
    }

    pub fn frequency_summary(&self, column: &str) -> Option<&FrequencySummary> {
        self.frequencies.get(column)
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    pub fn stats(&self) -> EngineStats {
        let sample_sizes = self
            .samples
            .iter()
            .map(|(strategy, sample)| (strategy, sample.row_count()))
            .collect();
        let sample_fractions = self
            .samples
            .iter()
            .map(|(strategy, sample)| (strategy, sample.table().fraction()))
            .collect();

        let summary_memory_bytes = self.cardinality.values().map(|s| s.memory_bytes()).sum::<usize>()
            + self.quantiles.values().map(|s| s.memory_bytes()).sum::<usize>()
            + self
                .frequencies
                .values()
                .map(|s| s.sketch.memory_bytes())
                .sum::<usize>()
            + self.samples.memory_usage();

        EngineStats {
            total_rows: self.total_rows,
            error_tolerance_percent: self.tolerance.percent(),
            params: self.params,
            primary_strategy: self.samples.primary(),
            sample_sizes,
            sample_fractions,
            cardinality_sketches: self.cardinality.len(),
            quantile_sketches: self.quantiles.len(),
            frequency_sketches: self.frequencies.len(),
            summary_memory_bytes,
            columns: self.columns.clone(),
            fitted_at: self.fitted_at,
            fit_duration_ms: self.fit_duration.as_secs_f64() * 1000.0,
        }
    }
}

/// Status snapshot of a fitted engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_rows: usize,
    pub error_tolerance_percent: f64,
    pub params: SketchParams,
    pub primary_strategy: SamplingStrategy,
    pub sample_sizes: BTreeMap<SamplingStrategy, usize>,
    pub sample_fractions: BTreeMap<SamplingStrategy, f64>,
    pub cardinality_sketches: usize,
    pub quantile_sketches: usize,
    pub frequency_sketches: usize,
    pub summary_memory_bytes: usize,
    pub columns: ColumnConfig,
    pub fitted_at: DateTime<Utc>,
    pub fit_duration_ms: f64,
}

/// Fail fast, before any summary is built
fn validate(
    dataset: &Dataset,
    columns: &ColumnConfig,
    config: &EngineConfig,
) -> Result<ErrorTolerance, ConfigError> {
    if dataset.is_empty() {
        return Err(ConfigError::EmptyDataset);
    }
    let tolerance = ErrorTolerance::from_percent(config.error_tolerance_percent)?;
    columns.validate(dataset.schema())?;
    if config.sample_strategies.is_empty() {
        return Err(ConfigError::InvalidParameter(
            "at least one sampling strategy is required".into(),
        ));
    }
    Ok(tolerance)
}

fn join<A, B, RA, RB>(parallel: bool, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if parallel {
        rayon::join(a, b)
    } else {
        (a(), b())
    }
}

/// Build one value per configured column, on the rayon pool when `parallel`
fn per_column<T, F>(names: &BTreeSet<String>, parallel: bool, build: F) -> HashMap<String, T>
where
    T: Send,
    F: Fn(&str) -> Option<T> + Sync + Send,
{
    if parallel {
        names
            .par_iter()
            .filter_map(|name| build(name).map(|v| (name.clone(), v)))
            .collect()
    } else {
        names
            .iter()
            .filter_map(|name| build(name).map(|v| (name.clone(), v)))
            .collect()
    }
}

fn build_cardinality(
    dataset: &Dataset,
    names: &BTreeSet<String>,
    precision: u32,
    parallel: bool,
) -> HashMap<String, HyperLogLog> {
    let start = Instant::now();
    let sketches = per_column(names, parallel, |name| {
        let column = dataset.column(name)?;
        let mut hll = HyperLogLog::new(precision);
        for key in column.keys() {
            hll.add_str(&key);
        }
        Some(hll)
    });
    tracing::debug!(columns = sketches.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Built cardinality sketches");
    sketches
}

fn build_quantiles(
    dataset: &Dataset,
    names: &BTreeSet<String>,
    k: usize,
    parallel: bool,
) -> HashMap<String, KllSketch> {
    let start = Instant::now();
    let sketches = per_column(names, parallel, |name| {
        let column = dataset.column(name)?;
        let mut sketch = KllSketch::new(k);
        for value in column.numeric_values() {
            sketch.add(value);
        }
        Some(sketch)
    });
    tracing::debug!(columns = sketches.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Built quantile sketches");
    sketches
}

fn build_frequencies(
    dataset: &Dataset,
    names: &BTreeSet<String>,
    params: &SketchParams,
    parallel: bool,
) -> HashMap<String, FrequencySummary> {
    let start = Instant::now();
    let summaries = per_column(names, parallel, |name| {
        let column = dataset.column(name)?;
        let mut sketch = CountMinSketch::new(params.cms_width, params.cms_depth);
        let mut keys = BTreeSet::new();
        for key in column.keys() {
            sketch.add(key.as_ref());
            if !keys.contains(key.as_ref()) {
                keys.insert(key.into_owned());
            }
        }
        Some(FrequencySummary { sketch, keys })
    });
    tracing::debug!(columns = summaries.len(), elapsed_ms = start.elapsed().as_millis() as u64, "Built frequency sketches");
    summaries
}

fn build_samples(
    dataset: &Dataset,
    dim_cols: &BTreeSet<String>,
    strategies: &[SamplingStrategy],
    plan: &SamplePlan,
    parallel: bool,
) -> BTreeMap<SamplingStrategy, crate::sampling::Sample> {
    let build = |strategy: &SamplingStrategy| {
        let start = Instant::now();
        let sample = build_sample(dataset, *strategy, dim_cols, plan);
        tracing::debug!(
            strategy = %strategy,
            rows = sample.row_count(),
            fraction = sample.table().fraction(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built sample table"
        );
        (*strategy, sample)
    };

    if parallel {
        strategies.par_iter().map(build).collect()
    } else {
        strategies.iter().map(build).collect()
    }
}
