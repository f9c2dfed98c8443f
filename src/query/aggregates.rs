use crate::data::{Column, Dataset};
use std::collections::BTreeMap;

/// Accumulator trait for aggregation functions. Every row arrives with a
/// weight, the number of population rows it stands for (1 for a full scan).
pub trait Accumulator: Send + Sync {
    /// Add one row; `None` is a missing or non-numeric cell
    fn accumulate(&mut self, value: Option<f64>, weight: f64);

    /// Get the final result, `None` when undefined (AVG of nothing)
    fn result(&self) -> Option<f64>;
}

/// Aggregations computed over rows (sample or full dataset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Row count, nulls included
    Count,
    Sum,
    Avg,
}

impl Aggregation {
    /// COUNT and SUM grow with the number of rows and need extrapolation
    pub fn scales_with_rows(&self) -> bool {
        matches!(self, Aggregation::Count | Aggregation::Sum)
    }
}

/// COUNT(*)
#[derive(Debug, Clone, Default)]
pub struct CountAccumulator {
    count: f64,
}

impl Accumulator for CountAccumulator {
    fn accumulate(&mut self, _value: Option<f64>, weight: f64) {
        self.count += weight;
    }

    fn result(&self) -> Option<f64> {
        Some(self.count)
    }
}

/// SUM(column); the sum of no values is 0
#[derive(Debug, Clone, Default)]
pub struct SumAccumulator {
    sum: f64,
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, value: Option<f64>, weight: f64) {
        if let Some(v) = value {
            self.sum += v * weight;
        }
    }

    fn result(&self) -> Option<f64> {
        Some(self.sum)
    }
}

/// AVG(column), the weighted mean of the non-missing values
#[derive(Debug, Clone, Default)]
pub struct AvgAccumulator {
    sum: f64,
    weight: f64,
}

impl Accumulator for AvgAccumulator {
    fn accumulate(&mut self, value: Option<f64>, weight: f64) {
        if let Some(v) = value {
            self.sum += v * weight;
            self.weight += weight;
        }
    }

    fn result(&self) -> Option<f64> {
        (self.weight > 0.0).then(|| self.sum / self.weight)
    }
}

/// Factory for creating accumulators
pub fn create_accumulator(aggregation: Aggregation) -> Box<dyn Accumulator> {
    match aggregation {
        Aggregation::Count => Box::new(CountAccumulator::default()),
        Aggregation::Sum => Box::new(SumAccumulator::default()),
        Aggregation::Avg => Box::new(AvgAccumulator::default()),
    }
}

fn weight_at(weights: Option<&[f64]>, row: usize) -> f64 {
    weights.and_then(|w| w.get(row)).copied().unwrap_or(1.0)
}

/// Aggregate `column` (ignored for COUNT) over every row. `weights`, when
/// given, holds one weight per row.
pub fn aggregate(
    rows: &Dataset,
    aggregation: Aggregation,
    column: Option<&Column>,
    weights: Option<&[f64]>,
) -> Option<f64> {
    let mut acc = create_accumulator(aggregation);
    for row in 0..rows.row_count() {
        acc.accumulate(column.and_then(|c| c.f64_at(row)), weight_at(weights, row));
    }
    acc.result()
}

/// Aggregate per distinct non-null value of `group`. Groups whose result is
/// undefined are left out.
pub fn aggregate_by_group(
    rows: &Dataset,
    aggregation: Aggregation,
    column: Option<&Column>,
    group: &Column,
    weights: Option<&[f64]>,
) -> BTreeMap<String, f64> {
    let mut groups: BTreeMap<String, Box<dyn Accumulator>> = BTreeMap::new();

    for row in 0..rows.row_count() {
        let Some(key) = group.key_at(row) else {
            continue;
        };
        let value = column.and_then(|c| c.f64_at(row));
        let weight = weight_at(weights, row);
        match groups.get_mut(key.as_ref()) {
            Some(acc) => acc.accumulate(value, weight),
            None => {
                let mut acc = create_accumulator(aggregation);
                acc.accumulate(value, weight);
                groups.insert(key.into_owned(), acc);
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|(key, acc)| acc.result().map(|v| (key, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use std::collections::HashMap;

    fn rows() -> Dataset {
        let mut builder = Dataset::builder();
        for (category, amount) in [("A", Some(1.0)), ("A", Some(3.0)), ("B", None), ("B", Some(4.0))] {
            let mut row = HashMap::new();
            row.insert("category".to_string(), Value::from(category));
            row.insert(
                "amount".to_string(),
                amount.map(Value::Float64).unwrap_or(Value::Null),
            );
            builder.push_row(row);
        }
        builder.push_row(HashMap::from([("amount".to_string(), Value::Float64(10.0))]));
        builder.finish()
    }

    #[test]
    fn test_count_accumulator() {
        let mut acc = CountAccumulator::default();
        acc.accumulate(Some(1.0), 1.0);
        acc.accumulate(None, 1.0);
        assert_eq!(acc.result(), Some(2.0));
    }

    #[test]
    fn test_avg_accumulator_is_weighted() {
        let mut acc = AvgAccumulator::default();
        acc.accumulate(Some(2.0), 3.0);
        acc.accumulate(Some(6.0), 1.0);
        acc.accumulate(None, 10.0);
        assert_eq!(acc.result(), Some(3.0));
        assert_eq!(AvgAccumulator::default().result(), None);
    }

    #[test]
    fn test_scalar_aggregates() {
        let data = rows();
        let amount = data.column("amount");
        assert_eq!(aggregate(&data, Aggregation::Count, None, None), Some(5.0));
        assert_eq!(aggregate(&data, Aggregation::Sum, amount, None), Some(18.0));
        assert_eq!(aggregate(&data, Aggregation::Avg, amount, None), Some(4.5));
    }

    #[test]
    fn test_weighted_aggregates() {
        let data = rows();
        let amount = data.column("amount");
        let category = data.column("category").unwrap();
        let weights = [2.0, 2.0, 5.0, 5.0, 1.0];

        assert_eq!(aggregate(&data, Aggregation::Count, None, Some(&weights[..])), Some(15.0));
        assert_eq!(aggregate(&data, Aggregation::Sum, amount, Some(&weights[..])), Some(38.0));

        let sums = aggregate_by_group(&data, Aggregation::Sum, amount, category, Some(&weights[..]));
        assert_eq!(sums, BTreeMap::from([("A".into(), 8.0), ("B".into(), 20.0)]));
        let avgs = aggregate_by_group(&data, Aggregation::Avg, amount, category, Some(&weights[..]));
        assert_eq!(avgs, BTreeMap::from([("A".into(), 2.0), ("B".into(), 4.0)]));
    }

    #[test]
    fn test_grouped_aggregates_skip_null_keys() {
        let data = rows();
        let amount = data.column("amount");
        let category = data.column("category").unwrap();

        let sums = aggregate_by_group(&data, Aggregation::Sum, amount, category, None);
        assert_eq!(sums, BTreeMap::from([("A".into(), 4.0), ("B".into(), 4.0)]));

        let counts = aggregate_by_group(&data, Aggregation::Count, None, category, None);
        assert_eq!(counts, BTreeMap::from([("A".into(), 2.0), ("B".into(), 2.0)]));
    }
}
