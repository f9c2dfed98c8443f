//! Accuracy comparison between an approximate and an exact answer.

use crate::query::QueryValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccuracyReport {
    Scalar {
        accuracy_percent: f64,
        error_percent: f64,
    },
    /// Mean relative error over groups with a nonzero exact value
    Grouped {
        accuracy_percent: f64,
        error_percent: f64,
        groups_compared: usize,
    },
    /// Exact value is zero and the approximation is not
    Undefined { reason: String },
    NotApplicable { reason: String },
}

impl AccuracyReport {
    pub fn error_percent(&self) -> Option<f64> {
        match self {
            AccuracyReport::Scalar { error_percent, .. }
            | AccuracyReport::Grouped { error_percent, .. } => Some(*error_percent),
            _ => None,
        }
    }

    pub fn accuracy_percent(&self) -> Option<f64> {
        match self {
            AccuracyReport::Scalar {
                accuracy_percent, ..
            }
            | AccuracyReport::Grouped {
                accuracy_percent, ..
            } => Some(*accuracy_percent),
            _ => None,
        }
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccuracyReport::Scalar {
                accuracy_percent,
                error_percent,
            } => write!(
                f,
                "{}% / {}% error",
                format_number(*accuracy_percent),
                format_number(*error_percent)
            ),
            AccuracyReport::Grouped {
                accuracy_percent,
                error_percent,
                groups_compared,
            } => write!(
                f,
                "{}% / {}% error (mean over {} groups)",
                format_number(*accuracy_percent),
                format_number(*error_percent),
                groups_compared
            ),
            AccuracyReport::Undefined { reason } => write!(f, "undefined ({})", reason),
            AccuracyReport::NotApplicable { reason } => write!(f, "not applicable ({})", reason),
        }
    }
}

/// Compare an approximate answer against the exact one
pub fn compare(approx: &QueryValue, exact: &QueryValue) -> AccuracyReport {
    match (approx, exact) {
        (QueryValue::Scalar(a), QueryValue::Scalar(e)) => compare_scalar(*a, *e),
        (QueryValue::Groups(a), QueryValue::Groups(e)) => compare_groups(a, e),
        _ => AccuracyReport::NotApplicable {
            reason: "approximate and exact results have different shapes".into(),
        },
    }
}

fn compare_scalar(approx: f64, exact: f64) -> AccuracyReport {
    if exact == 0.0 {
        return if approx == 0.0 {
            AccuracyReport::Scalar {
                accuracy_percent: 100.0,
                error_percent: 0.0,
            }
        } else {
            AccuracyReport::Undefined {
                reason: "exact is zero".into(),
            }
        };
    }

    let error = (approx - exact).abs() / exact.abs();
    AccuracyReport::Scalar {
        accuracy_percent: 100.0 * (1.0 - error),
        error_percent: 100.0 * error,
    }
}

fn compare_groups(approx: &BTreeMap<String, f64>, exact: &BTreeMap<String, f64>) -> AccuracyReport {
    if exact.is_empty() {
        return AccuracyReport::NotApplicable {
            reason: "exact result has no groups".into(),
        };
    }

    let errors: Vec<f64> = exact
        .iter()
        .filter(|&(_, &e)| e != 0.0)
        .map(|(key, &e)| {
            let a = approx.get(key).copied().unwrap_or(0.0);
            (a - e).abs() / e.abs()
        })
        .collect();

    if errors.is_empty() {
        return AccuracyReport::NotApplicable {
            reason: "every exact group value is zero".into(),
        };
    }

    let mean = errors.iter().sum::<f64>() / errors.len() as f64;
    AccuracyReport::Grouped {
        accuracy_percent: 100.0 * (1.0 - mean),
        error_percent: 100.0 * mean,
        groups_compared: errors.len(),
    }
}

/// Up to four decimals with trailing zeros trimmed
fn format_number(value: f64) -> String {
    let formatted = format!("{:.4}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(pairs: &[(&str, f64)]) -> QueryValue {
        QueryValue::Groups(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_exact_match() {
        let report = compare(&QueryValue::Scalar(100.0), &QueryValue::Scalar(100.0));
        assert_eq!(report.to_string(), "100% / 0% error");
    }

    #[test]
    fn test_ten_percent_off() {
        let report = compare(&QueryValue::Scalar(90.0), &QueryValue::Scalar(100.0));
        assert_eq!(report.error_percent(), Some(10.0));
        assert_eq!(report.accuracy_percent(), Some(90.0));
        assert_eq!(report.to_string(), "90% / 10% error");
    }

    #[test]
    fn test_exact_zero() {
        let zero = QueryValue::Scalar(0.0);
        assert_eq!(compare(&zero, &zero).to_string(), "100% / 0% error");
        assert_eq!(
            compare(&QueryValue::Scalar(3.0), &zero).to_string(),
            "undefined (exact is zero)"
        );
    }

    #[test]
    fn test_grouped_skips_zero_exact_keys() {
        let value = groups(&[("A", 10.0), ("B", 0.0)]);
        let report = compare(&value, &value);
        assert_eq!(
            report,
            AccuracyReport::Grouped {
                accuracy_percent: 100.0,
                error_percent: 0.0,
                groups_compared: 1,
            }
        );
    }

    #[test]
    fn test_grouped_missing_key_counts_as_zero() {
        let report = compare(&groups(&[("A", 10.0)]), &groups(&[("A", 10.0), ("B", 5.0)]));
        assert_eq!(report.error_percent(), Some(50.0));
    }

    #[test]
    fn test_not_applicable() {
        assert!(matches!(
            compare(&groups(&[("A", 1.0)]), &groups(&[])),
            AccuracyReport::NotApplicable { .. }
        ));
        assert!(matches!(
            compare(&QueryValue::Scalar(1.0), &groups(&[("A", 1.0)])),
            AccuracyReport::NotApplicable { .. }
        ));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(99.123456), "99.1235");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(-0.00001), "0");
    }
}
