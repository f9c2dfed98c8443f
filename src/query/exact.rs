//! Ground-truth execution over the full dataset, used to measure accuracy.

use super::aggregates::{aggregate, aggregate_by_group, Aggregation};
use super::parser::{parse_query, AggregateFunction, QueryShape};
use super::result::{ExactResult, QueryValue};
use crate::data::{Column, ColumnRole, Dataset};
use crate::error::{ConfigError, QueryError};
use fxhash::FxHashSet;
use std::time::Instant;

/// Run a query exactly. `USING` clauses are accepted and ignored; only
/// column existence and numeric types are checked, not column roles.
pub fn exact_query(dataset: &Dataset, text: &str) -> Result<ExactResult, QueryError> {
    let start = Instant::now();
    let parsed = parse_query(text)?;

    let value = match &parsed.shape {
        QueryShape::CountDistinct { column } => {
            let col = column_for(dataset, column, ColumnRole::Distinct)?;
            let distinct: FxHashSet<_> = col.keys().collect();
            QueryValue::Scalar(distinct.len() as f64)
        }
        QueryShape::Quantile { column, q, .. } => {
            let col = numeric_column(dataset, column)?;
            let mut values: Vec<f64> = col.numeric_values().collect();
            values.sort_unstable_by(|a, b| a.total_cmp(b));
            let value = interpolated_quantile(&values, *q).ok_or_else(|| {
                QueryError::Computation(format!("column '{}' has no numeric values", column))
            })?;
            QueryValue::Scalar(value)
        }
        QueryShape::Count => QueryValue::Scalar(dataset.row_count() as f64),
        QueryShape::Aggregate {
            function,
            column,
            group_by,
        } => {
            let col = numeric_column(dataset, column)?;
            let aggregation = match function {
                AggregateFunction::Sum => Aggregation::Sum,
                AggregateFunction::Avg => Aggregation::Avg,
            };
            match group_by {
                Some(group) => {
                    let group_col = column_for(dataset, group, ColumnRole::Dimension)?;
                    QueryValue::Groups(aggregate_by_group(
                        dataset,
                        aggregation,
                        Some(col),
                        group_col,
                        None,
                    ))
                }
                None => {
                    let value = aggregate(dataset, aggregation, Some(col), None).ok_or_else(|| {
                        QueryError::Computation(format!(
                            "column '{}' has no numeric values",
                            column
                        ))
                    })?;
                    QueryValue::Scalar(value)
                }
            }
        }
        QueryShape::GroupCount { column } => {
            let col = column_for(dataset, column, ColumnRole::Dimension)?;
            QueryValue::Groups(aggregate_by_group(dataset, Aggregation::Count, None, col, None))
        }
    };

    Ok(ExactResult {
        query: parsed.to_string(),
        value,
        elapsed: start.elapsed(),
    })
}

/// Linear interpolation between the closest ranks of sorted `values`
pub fn interpolated_quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}

fn column_for<'a>(
    dataset: &'a Dataset,
    column: &str,
    role: ColumnRole,
) -> Result<&'a Column, QueryError> {
    dataset.column(column).ok_or_else(|| {
        ConfigError::MissingColumn {
            role,
            column: column.to_string(),
        }
        .into()
    })
}

fn numeric_column<'a>(dataset: &'a Dataset, column: &str) -> Result<&'a Column, QueryError> {
    let col = column_for(dataset, column, ColumnRole::Numeric)?;
    if !col.data_type().is_numeric() {
        return Err(ConfigError::NonNumericColumn {
            column: column.to_string(),
            data_type: col.data_type(),
        }
        .into());
    }
    Ok(col)
}
