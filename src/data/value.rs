use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One cell of an uploaded row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Null and NaN both count as missing
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Scalars map to their own variant. Nested arrays and objects never
    /// reach here once a row is flattened, so they read as missing.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int64)
                .or_else(|| n.as_f64().map(Value::Float64))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            _ => Value::Null,
        }
    }
}

/// Flatten one uploaded JSON object into column names and cells. Nested
/// objects join their keys with `.`, array elements use their index:
/// `{"user": {"id": "u1"}, "tags": ["a"]}` gives `user.id` and `tags.0`.
pub fn flatten_json(object: &serde_json::Map<String, serde_json::Value>) -> HashMap<String, Value> {
    let mut row = HashMap::new();
    for (key, value) in object {
        flatten_into(&mut row, key.clone(), value);
    }
    row
}

fn flatten_into(row: &mut HashMap<String, Value>, path: String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(nested) => {
            for (key, child) in nested {
                flatten_into(row, format!("{}.{}", path, key), child);
            }
        }
        serde_json::Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                flatten_into(row, format!("{}.{}", path, idx), child);
            }
        }
        scalar => {
            row.insert(path, Value::from_json(scalar));
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Inferred type of a dataset column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
}

impl DataType {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::String,
        }
    }

    /// Widest type able to hold both. Integers widen to floats; any other
    /// mix falls back to strings.
    pub fn merge(&self, other: &DataType) -> DataType {
        match (*self, *other) {
            (a, b) if a == b => a,
            (DataType::Null, t) | (t, DataType::Null) => t,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            _ => DataType::String,
        }
    }

    /// Whether SUM/AVG/QUANTILE can run over this type (an all-null column qualifies)
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64 | DataType::Null)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::Bool => "BOOL",
            DataType::Int64 => "INT64",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(42)), Value::Int64(42));
        assert_eq!(Value::from_json(&serde_json::json!(3.5)), Value::Float64(3.5));
        assert_eq!(Value::from_json(&serde_json::json!("hello")), Value::from("hello"));
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Bool(true));
        assert_eq!(Value::from_json(&serde_json::Value::Null), Value::Null);
    }

    #[test]
    fn test_flatten_nested_object() {
        let json = serde_json::json!({"user": {"id": "u1"}, "tags": ["a", "b"], "amount": 3});
        let row = flatten_json(json.as_object().unwrap());

        assert_eq!(row.get("user.id"), Some(&Value::String("u1".into())));
        assert_eq!(row.get("tags.1"), Some(&Value::String("b".into())));
        assert_eq!(row.get("amount"), Some(&Value::Int64(3)));
        assert_eq!(row.len(), 4);
    }

    #[test]
    fn test_nan_is_missing() {
        assert!(Value::Float64(f64::NAN).is_null());
        assert!(Value::Null.is_null());
        assert!(!Value::Float64(0.0).is_null());
    }

    #[test]
    fn test_type_merge() {
        assert_eq!(DataType::Int64.merge(&DataType::Float64), DataType::Float64);
        assert_eq!(DataType::Null.merge(&DataType::String), DataType::String);
        assert_eq!(DataType::Bool.merge(&DataType::Int64), DataType::String);
        assert_eq!(DataType::Bool.merge(&DataType::Bool), DataType::Bool);
        assert!(DataType::Float64.is_numeric());
        assert!(!DataType::String.is_numeric());
    }
}
