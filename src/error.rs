use crate::data::{ColumnRole, DataType};
use crate::query::ParseError;

/// Fit-time failures. Raised before any summary is built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{role} column '{column}' does not exist in the dataset")]
    MissingColumn { role: ColumnRole, column: String },

    #[error("column '{column}' has type {data_type} and cannot be used as a numeric column")]
    NonNumericColumn { column: String, data_type: DataType },

    #[error("error tolerance {0} is outside the supported range [0.001, 0.10]")]
    ErrorToleranceOutOfRange(f64),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Query-time failures, returned inside a result rather than raised.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Lookup error: {0}")]
    Lookup(String),

    #[error("Computation error: {0}")]
    Computation(String),
}

impl QueryError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Config(_) => "ConfigError",
            QueryError::Parse(_) => "ParseError",
            QueryError::Lookup(_) => "LookupError",
            QueryError::Computation(_) => "ComputationError",
        }
    }
}

impl From<ConfigError> for QueryError {
    fn from(e: ConfigError) -> Self {
        QueryError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(QueryError::Lookup("x".into()).kind(), "LookupError");
        assert_eq!(
            QueryError::from(ParseError::EmptyQuery).kind(),
            "ParseError"
        );
        assert_eq!(
            QueryError::from(ConfigError::EmptyDataset).kind(),
            "ConfigError"
        );
    }

    #[test]
    fn test_missing_column_message() {
        let err = ConfigError::MissingColumn {
            role: ColumnRole::Numeric,
            column: "price".into(),
        };
        assert_eq!(
            err.to_string(),
            "numeric column 'price' does not exist in the dataset"
        );
    }
}
