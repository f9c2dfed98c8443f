use super::value::DataType;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The role a column plays in query routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    /// Groupable categorical column
    Dimension,
    /// Eligible for SUM / AVG / MEDIAN / QUANTILE
    Numeric,
    /// Eligible for COUNT DISTINCT
    Distinct,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Dimension => write!(f, "dimension"),
            ColumnRole::Numeric => write!(f, "numeric"),
            ColumnRole::Distinct => write!(f, "distinct"),
        }
    }
}

/// Column role assignment for a dataset. Names are lowercased on insert,
/// and a column may appear in more than one set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub dim_cols: BTreeSet<String>,
    #[serde(default)]
    pub numeric_cols: BTreeSet<String>,
    #[serde(default)]
    pub distinct_cols: BTreeSet<String>,
}

fn normalize<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ColumnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dims<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dim_cols = normalize(names);
        self
    }

    pub fn with_numeric<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.numeric_cols = normalize(names);
        self
    }

    pub fn with_distinct<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.distinct_cols = normalize(names);
        self
    }

    /// Parse a comma-separated list such as `"amount, value"`
    pub fn parse_list(list: &str) -> BTreeSet<String> {
        normalize(list.split(','))
    }

    pub fn columns(&self, role: ColumnRole) -> &BTreeSet<String> {
        match role {
            ColumnRole::Dimension => &self.dim_cols,
            ColumnRole::Numeric => &self.numeric_cols,
            ColumnRole::Distinct => &self.distinct_cols,
        }
    }

    pub fn has_role(&self, column: &str, role: ColumnRole) -> bool {
        self.columns(role).contains(column)
    }

    /// Check every configured column against the dataset schema.
    /// Numeric columns must also carry a numeric type.
    pub fn validate(&self, schema: &BTreeMap<String, DataType>) -> Result<(), ConfigError> {
        for role in [ColumnRole::Dimension, ColumnRole::Numeric, ColumnRole::Distinct] {
            for column in self.columns(role) {
                let data_type = schema.get(column).ok_or_else(|| ConfigError::MissingColumn {
                    role,
                    column: column.clone(),
                })?;

                if role == ColumnRole::Numeric && !data_type.is_numeric() {
                    return Err(ConfigError::NonNumericColumn {
                        column: column.clone(),
                        data_type: *data_type,
                    });
                }
            }
        }
        Ok(())
    }

    /// Keep only the columns present in the schema. The serving layer uses
    /// this so an uploaded dataset lacking a default column can still be fit.
    pub fn restrict_to(&self, schema: &BTreeMap<String, DataType>) -> ColumnConfig {
        let keep = |set: &BTreeSet<String>| -> BTreeSet<String> {
            set.iter()
                .filter(|c| schema.contains_key(c.as_str()))
                .cloned()
                .collect()
        };
        ColumnConfig {
            dim_cols: keep(&self.dim_cols),
            numeric_cols: keep(&self.numeric_cols)
                .into_iter()
                .filter(|c| schema.get(c).map(|t| t.is_numeric()).unwrap_or(false))
                .collect(),
            distinct_cols: keep(&self.distinct_cols),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> BTreeMap<String, DataType> {
        BTreeMap::from([
            ("amount".to_string(), DataType::Float64),
            ("category".to_string(), DataType::String),
            ("user_id".to_string(), DataType::Int64),
        ])
    }

    #[test]
    fn test_names_are_normalized() {
        let config = ColumnConfig::new().with_dims(["Category ", ""]);
        assert!(config.has_role("category", ColumnRole::Dimension));
        assert_eq!(config.dim_cols.len(), 1);
        assert_eq!(
            ColumnConfig::parse_list("Amount, value,,"),
            BTreeSet::from(["amount".to_string(), "value".to_string()])
        );
    }

    #[test]
    fn test_validate_ok() {
        let config = ColumnConfig::new()
            .with_dims(["category"])
            .with_numeric(["amount"])
            .with_distinct(["user_id", "category"]);
        assert!(config.validate(&schema()).is_ok());
    }

    #[test]
    fn test_validate_missing_column() {
        let config = ColumnConfig::new().with_numeric(["price"]);
        assert_eq!(
            config.validate(&schema()),
            Err(ConfigError::MissingColumn {
                role: ColumnRole::Numeric,
                column: "price".into()
            })
        );
    }

    #[test]
    fn test_validate_non_numeric() {
        let config = ColumnConfig::new().with_numeric(["category"]);
        assert!(matches!(
            config.validate(&schema()),
            Err(ConfigError::NonNumericColumn { .. })
        ));
    }

    #[test]
    fn test_restrict_to_schema() {
        let config = ColumnConfig::new()
            .with_numeric(["amount", "value", "category"])
            .with_distinct(["user_id"]);
        let restricted = config.restrict_to(&schema());
        assert_eq!(restricted.numeric_cols, BTreeSet::from(["amount".to_string()]));
        assert!(restricted.validate(&schema()).is_ok());
    }
}
