//! Routes a parsed query to the summary that answers it.
//!
//! | Query                  | Summary                                   |
//! |------------------------|-------------------------------------------|
//! | `COUNT DISTINCT c`     | HyperLogLog on a distinct column          |
//! | `MEDIAN c`, `QUANTILE` | KLL sketch on a numeric column            |
//! | `COUNT`, `SUM`, `AVG`  | sample table, extrapolated by its fraction|
//! | `... GROUP BY d`       | sample table (stratified when built)      |
//! | `GROUPBY d`            | Count-Min sketch, or a sample table       |

use super::aggregates::{aggregate, aggregate_by_group, Aggregation};
use super::parser::{AggregateFunction, ParsedQuery, QueryShape, Technique};
use super::result::{Answer, ErrorBound, QueryValue, SummaryKind};
use crate::data::ColumnRole;
use crate::engine::{Engine, GroupCountTechnique};
use crate::error::QueryError;
use crate::sampling::{Sample, SampleTable, SamplingStrategy};
use std::collections::BTreeMap;

/// Tolerances at or below this prefer the adaptive sample for scalars
const ADAPTIVE_PREFERENCE_THRESHOLD: f64 = 0.02;

/// Guards the adaptive diagnostic against division by zero
const DIAGNOSTIC_EPSILON: f64 = 1e-6;

/// An answer plus the explanation of how it was produced
#[derive(Debug, Clone)]
pub struct Routed {
    pub answer: Answer,
    pub explanation: String,
}

pub fn route(engine: &Engine, parsed: &ParsedQuery) -> Result<Routed, QueryError> {
    match &parsed.shape {
        QueryShape::CountDistinct { column } => count_distinct(engine, column),
        QueryShape::Quantile { column, q, .. } => quantile(engine, column, *q),
        QueryShape::Count => sampled(engine, parsed, Aggregation::Count, None, None),
        QueryShape::Aggregate {
            function,
            column,
            group_by,
        } => {
            require_role(engine, column, ColumnRole::Numeric)?;
            if let Some(group) = group_by {
                require_role(engine, group, ColumnRole::Dimension)?;
            }
            let aggregation = match function {
                AggregateFunction::Sum => Aggregation::Sum,
                AggregateFunction::Avg => Aggregation::Avg,
            };
            sampled(engine, parsed, aggregation, Some(column), group_by.as_deref())
        }
        QueryShape::GroupCount { column } => {
            require_role(engine, column, ColumnRole::Dimension)?;
            let technique = match parsed.using {
                Some(Technique::CountMin) => GroupCountTechnique::CountMin,
                Some(_) => GroupCountTechnique::Sample,
                None => engine.config().group_count_technique,
            };
            match technique {
                GroupCountTechnique::CountMin => group_count(engine, column),
                GroupCountTechnique::Sample => {
                    sampled(engine, parsed, Aggregation::Count, None, Some(column))
                }
            }
        }
    }
}

/// Explanation attached to a rejected query
pub fn explain_error(err: &QueryError) -> String {
    let hint = match err {
        QueryError::Parse(_) => {
            "Supported queries: COUNT, COUNT DISTINCT <col>, SUM <col>, AVG <col>, \
             SUM|AVG <col> GROUP BY <col>, GROUPBY <col>, MEDIAN <col>, QUANTILE <col> <q>, \
             each optionally followed by USING <technique>."
        }
        QueryError::Config(_) => "The column configuration cannot serve this query.",
        QueryError::Lookup(_) => {
            "No summary was built for this column or technique; refit with the column \
             registered under the matching role or with the strategy enabled."
        }
        QueryError::Computation(_) => "The summary exists but holds no usable values.",
    };
    format!("Query rejected: {}. {}", err, hint)
}

/// Every summary is keyed by a role set, so a column outside that set has
/// nothing to answer from whether or not the dataset carries it.
fn require_role(engine: &Engine, column: &str, role: ColumnRole) -> Result<(), QueryError> {
    if engine.columns().has_role(column, role) {
        return Ok(());
    }
    let reason = if engine.schema().contains_key(column) {
        "is not registered as"
    } else {
        "does not exist in the fitted dataset and is not"
    };
    Err(QueryError::Lookup(format!(
        "column '{}' {} a {} column",
        column, reason, role
    )))
}

fn count_distinct(engine: &Engine, column: &str) -> Result<Routed, QueryError> {
    require_role(engine, column, ColumnRole::Distinct)?;
    let hll = engine.cardinality_sketch(column).ok_or_else(|| {
        QueryError::Lookup(format!("no cardinality sketch for column '{}'", column))
    })?;

    let explanation = format!(
        "Answered from the HyperLogLog sketch on '{column}'. HyperLogLog estimates distinct \
         counts from {registers} registers without storing values. Precision p={p} was chosen \
         for the {tolerance}% error tolerance, giving a relative standard error of {rse:.2}%.",
        column = column,
        registers = 1usize << hll.precision(),
        p = hll.precision(),
        tolerance = engine.tolerance().percent(),
        rse = hll.relative_error() * 100.0,
    );

    Ok(Routed {
        answer: Answer {
            value: QueryValue::Scalar(hll.estimate()),
            error_bound: ErrorBound::Cardinality {
                fraction: hll.relative_error(),
                upper_bound: hll.upper_bound(),
            },
            summary: SummaryKind::HyperLogLog,
        },
        explanation,
    })
}

fn quantile(engine: &Engine, column: &str, q: f64) -> Result<Routed, QueryError> {
    require_role(engine, column, ColumnRole::Numeric)?;
    let sketch = engine.quantile_sketch(column).ok_or_else(|| {
        QueryError::Lookup(format!("no quantile sketch for column '{}'", column))
    })?;
    let value = sketch.quantile(q).ok_or_else(|| {
        QueryError::Computation(format!("column '{}' has no numeric values", column))
    })?;

    let explanation = format!(
        "Answered from the KLL quantile sketch on '{column}' (k={k}, {retained} of {count} \
         values retained). KLL keeps a compacted summary of the value distribution. Its \
         normalized rank error of {rank:.2}% depends only on k and is independent of the \
         error tolerance.",
        column = column,
        k = sketch.k(),
        retained = sketch.retained(),
        count = sketch.count(),
        rank = sketch.rank_error() * 100.0,
    );

    Ok(Routed {
        answer: Answer {
            value: QueryValue::Scalar(value),
            error_bound: ErrorBound::Rank {
                fraction: sketch.rank_error(),
            },
            summary: SummaryKind::Kll,
        },
        explanation,
    })
}

fn group_count(engine: &Engine, column: &str) -> Result<Routed, QueryError> {
    let summary = engine.frequency_summary(column).ok_or_else(|| {
        QueryError::Lookup(format!("no frequency sketch for column '{}'", column))
    })?;
    let sketch = &summary.sketch;

    let groups: BTreeMap<String, f64> = summary
        .keys
        .iter()
        .map(|key| (key.clone(), sketch.estimate(key.as_str()) as f64))
        .collect();

    let explanation = format!(
        "Answered from the Count-Min sketch on '{column}' ({width}x{depth} counters) for each \
         of the {keys} keys seen at fit time. Count-Min never under-counts; each estimate \
         over-counts by at most {fraction:.2}% of the {total} rows with high probability.",
        column = column,
        width = sketch.width(),
        depth = sketch.depth(),
        keys = summary.keys.len(),
        fraction = sketch.error_fraction() * 100.0,
        total = sketch.total(),
    );

    Ok(Routed {
        answer: Answer {
            value: QueryValue::Groups(groups),
            error_bound: ErrorBound::Additive {
                fraction: sketch.error_fraction(),
                total: sketch.total() as f64,
            },
            summary: SummaryKind::CountMin,
        },
        explanation,
    })
}

/// Pick the sample for a query. An explicit strategy must have been built;
/// otherwise the preferred strategy falls back to the primary one.
fn choose_strategy(engine: &Engine, parsed: &ParsedQuery) -> Result<SamplingStrategy, QueryError> {
    let samples = engine.samples();
    match parsed.using {
        Some(Technique::Strategy(strategy)) => {
            if samples.contains(strategy) {
                Ok(strategy)
            } else {
                let built: Vec<String> = samples.strategies().map(|s| s.to_string()).collect();
                Err(QueryError::Lookup(format!(
                    "no {} sample was built; available: {}",
                    strategy,
                    built.join(", ")
                )))
            }
        }
        Some(Technique::Sample) => Ok(samples.primary()),
        Some(Technique::CountMin) => Err(QueryError::Parse(
            super::parser::ParseError::TechniqueNotApplicable {
                technique: Technique::CountMin.to_string(),
                query: parsed.shape.name(),
            },
        )),
        None => {
            let preferred = if parsed.shape.is_grouped() {
                SamplingStrategy::Stratified
            } else if engine.tolerance().value() <= ADAPTIVE_PREFERENCE_THRESHOLD {
                SamplingStrategy::Adaptive
            } else {
                SamplingStrategy::Random
            };
            Ok(if samples.contains(preferred) {
                preferred
            } else {
                samples.primary()
            })
        }
    }
}

fn sampled(
    engine: &Engine,
    parsed: &ParsedQuery,
    aggregation: Aggregation,
    column: Option<&str>,
    group_by: Option<&str>,
) -> Result<Routed, QueryError> {
    let strategy = choose_strategy(engine, parsed)?;
    let sample = engine.samples().get(strategy).ok_or_else(|| {
        QueryError::Lookup(format!("no {} sample was built", strategy))
    })?;

    let (value, error_bound) = match sample {
        Sample::Single(table) => {
            let value = evaluate(table, aggregation, column, group_by)?;
            let bound = match group_by {
                Some(group) => grouped_bound(table, group),
                None => ErrorBound::Relative {
                    fraction: 1.0 / (table.len().max(1) as f64).sqrt(),
                },
            };
            (value, bound)
        }
        Sample::Adaptive { coarse, fine } => {
            let value = evaluate(coarse, aggregation, column, group_by)?;
            let check = evaluate(fine, aggregation, column, group_by)?;
            let bound = ErrorBound::Diagnostic {
                estimated_error: self_consistency(&value, &check),
            };
            (value, bound)
        }
    };

    let table = sample.table();
    let extrapolation = if aggregation.scales_with_rows() && table.weights().is_some() {
        "Each sample row is weighted by its stratum size over the rows drawn from that \
         stratum to estimate full-dataset totals."
            .to_string()
    } else if aggregation.scales_with_rows() {
        format!(
            "Counts and sums are divided by the sample fraction {:.4} to estimate full-dataset totals.",
            table.fraction()
        )
    } else {
        "Averages are reported unscaled.".to_string()
    };
    let adaptive_note = match sample {
        Sample::Adaptive { fine, .. } => format!(
            " A second draw of {} rows gives the self-consistency diagnostic; it is not a \
             confidence bound.",
            fine.len()
        ),
        Sample::Single(_) => String::new(),
    };
    let explanation = format!(
        "Answered from the {strategy} sample ({rows} of {total} rows). {rationale}. \
         {extrapolation}{adaptive_note}",
        strategy = strategy,
        rows = table.len(),
        total = engine.total_rows(),
        rationale = strategy.rationale(),
        extrapolation = extrapolation,
        adaptive_note = adaptive_note,
    );

    Ok(Routed {
        answer: Answer {
            value,
            error_bound,
            summary: SummaryKind::Sample(strategy),
        },
        explanation,
    })
}

/// Aggregate over one sample table. COUNT and SUM are scaled by the table's
/// fraction, or by per-row weights when the table carries them.
fn evaluate(
    table: &SampleTable,
    aggregation: Aggregation,
    column: Option<&str>,
    group_by: Option<&str>,
) -> Result<QueryValue, QueryError> {
    if table.is_empty() || table.fraction() <= 0.0 {
        return Err(QueryError::Computation(format!(
            "the {} sample is empty; refit with a larger dataset or a tighter error tolerance",
            table.strategy()
        )));
    }

    let rows = table.rows();
    let values = column.and_then(|c| rows.column(c));
    let weights = table.weights();
    let scale = if weights.is_none() && aggregation.scales_with_rows() {
        1.0 / table.fraction()
    } else {
        1.0
    };

    match group_by {
        Some(group) => {
            let group_col = rows.column(group).ok_or_else(|| {
                QueryError::Lookup(format!("column '{}' is missing from the sample", group))
            })?;
            let groups = aggregate_by_group(rows, aggregation, values, group_col, weights)
                .into_iter()
                .map(|(key, v)| (key, v * scale))
                .collect();
            Ok(QueryValue::Groups(groups))
        }
        None => {
            let value = aggregate(rows, aggregation, values, weights).ok_or_else(|| {
                QueryError::Computation(format!(
                    "the {} sample holds no numeric values for '{}'",
                    table.strategy(),
                    column.unwrap_or_default()
                ))
            })?;
            Ok(QueryValue::Scalar(value * scale))
        }
    }
}

fn grouped_bound(table: &SampleTable, group: &str) -> ErrorBound {
    let smallest = table
        .rows()
        .column(group)
        .map(|col| aggregate_by_group(table.rows(), Aggregation::Count, None, col, None))
        .and_then(|sizes| sizes.into_values().reduce(f64::min))
        .unwrap_or(0.0);
    ErrorBound::Qualitative {
        description: format!(
            "per-group error proportional to 1/sqrt(per-group sample size); smallest group has {} sample rows",
            smallest
        ),
    }
}

/// `|r1 - r2| / (|r2| + 1e-6)`, averaged over the first draw's groups
fn self_consistency(first: &QueryValue, second: &QueryValue) -> f64 {
    let relative = |a: f64, b: f64| (a - b).abs() / (b.abs() + DIAGNOSTIC_EPSILON);
    match (first, second) {
        (QueryValue::Scalar(a), QueryValue::Scalar(b)) => relative(*a, *b),
        (QueryValue::Groups(a), QueryValue::Groups(b)) => {
            if a.is_empty() {
                return 0.0;
            }
            let total: f64 = a
                .iter()
                .map(|(key, v)| relative(*v, b.get(key).copied().unwrap_or(0.0)))
                .sum();
            total / a.len() as f64
        }
        _ => f64::NAN,
    }
}
