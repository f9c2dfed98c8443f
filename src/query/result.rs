use crate::error::QueryError;
use crate::sampling::SamplingStrategy;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A query answer: one number, or one number per group key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Scalar(f64),
    Groups(BTreeMap<String, f64>),
}

impl QueryValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            QueryValue::Scalar(v) => Some(*v),
            QueryValue::Groups(_) => None,
        }
    }

    pub fn as_groups(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            QueryValue::Groups(groups) => Some(groups),
            QueryValue::Scalar(_) => None,
        }
    }
}

/// Error characterization attached to an approximate answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorBound {
    /// One relative standard error of the estimate
    Relative { fraction: f64 },
    /// Cardinality estimate error with its one-standard-error upper bound
    Cardinality { fraction: f64, upper_bound: f64 },
    /// Normalized rank error, fixed by the sketch's `k`
    Rank { fraction: f64 },
    /// One-sided over-estimate of at most `fraction` of `total` rows
    Additive { fraction: f64, total: f64 },
    /// Self-consistency between two sample sizes; not a confidence bound
    Diagnostic { estimated_error: f64 },
    /// No single number describes the error
    Qualitative { description: String },
}

impl fmt::Display for ErrorBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBound::Relative { fraction } => {
                write!(f, "±{:.2}% relative standard error", fraction * 100.0)
            }
            ErrorBound::Cardinality {
                fraction,
                upper_bound,
            } => write!(
                f,
                "±{:.2}% relative standard error, upper bound {:.1}",
                fraction * 100.0,
                upper_bound
            ),
            ErrorBound::Rank { fraction } => write!(
                f,
                "±{:.2}% normalized rank error (independent of the error tolerance)",
                fraction * 100.0
            ),
            ErrorBound::Additive { fraction, total } => write!(
                f,
                "over-estimates by at most {:.2}% of {} rows ({:.1})",
                fraction * 100.0,
                total,
                fraction * total
            ),
            ErrorBound::Diagnostic { estimated_error } => write!(
                f,
                "{:.2}% estimated error (diagnostic, not a guarantee)",
                estimated_error * 100.0
            ),
            ErrorBound::Qualitative { description } => write!(f, "{}", description),
        }
    }
}

/// Which summary produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    HyperLogLog,
    Kll,
    CountMin,
    Sample(SamplingStrategy),
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryKind::HyperLogLog => write!(f, "hyperloglog"),
            SummaryKind::Kll => write!(f, "kll"),
            SummaryKind::CountMin => write!(f, "countmin"),
            SummaryKind::Sample(strategy) => write!(f, "{}_sample", strategy),
        }
    }
}

impl Serialize for SummaryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A successful approximate answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub value: QueryValue,
    pub error_bound: ErrorBound,
    pub summary: SummaryKind,
}

/// Outcome of one query. Failures carry the same explanation and timing
/// as successes.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: String,
    pub outcome: Result<Answer, QueryError>,
    pub explanation: String,
    pub elapsed: Duration,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&QueryValue> {
        self.outcome.as_ref().ok().map(|a| &a.value)
    }

    pub fn error(&self) -> Option<&QueryError> {
        self.outcome.as_ref().err()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

#[derive(Serialize)]
struct QueryResultRepr<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a QueryValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_bound: Option<&'a ErrorBound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_bound_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    technique: Option<SummaryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    explanation: &'a str,
    elapsed_ms: f64,
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let answer = self.outcome.as_ref().ok();
        let error = self.outcome.as_ref().err();
        QueryResultRepr {
            query: &self.query,
            result: answer.map(|a| &a.value),
            error_bound: answer.map(|a| &a.error_bound),
            error_bound_text: answer.map(|a| a.error_bound.to_string()),
            technique: answer.map(|a| a.summary),
            error: error.map(|e| e.to_string()),
            error_kind: error.map(|e| e.kind()),
            explanation: &self.explanation,
            elapsed_ms: self.elapsed_ms(),
        }
        .serialize(serializer)
    }
}

/// Ground-truth answer over the full dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactResult {
    pub query: String,
    pub value: QueryValue,
    #[serde(serialize_with = "serialize_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_ms<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64() * 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_error_shape() {
        let result = QueryResult {
            query: "FOO bar".into(),
            outcome: Err(QueryError::Lookup("no summary".into())),
            explanation: "rejected".into(),
            elapsed: Duration::from_millis(2),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error_kind"], "LookupError");
        assert_eq!(json["explanation"], "rejected");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_result_serializes_answer() {
        let result = QueryResult {
            query: "COUNT DISTINCT category".into(),
            outcome: Ok(Answer {
                value: QueryValue::Scalar(4.0),
                error_bound: ErrorBound::Relative { fraction: 0.01 },
                summary: SummaryKind::HyperLogLog,
            }),
            explanation: "hll".into(),
            elapsed: Duration::from_micros(10),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"], 4.0);
        assert_eq!(json["technique"], "hyperloglog");
        assert_eq!(json["error_bound"]["kind"], "relative");
    }

    #[test]
    fn test_diagnostic_wording() {
        let bound = ErrorBound::Diagnostic {
            estimated_error: 0.05,
        };
        assert!(bound.to_string().contains("diagnostic"));
        assert!(!bound.to_string().contains("guaranteed"));
    }
}
