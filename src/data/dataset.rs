use super::column::Column;
use super::value::{flatten_json, DataType, Value};
use std::collections::{BTreeMap, HashMap};

/// Immutable columnar dataset handed to the engine at fit time.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Columns indexed by (lowercased) column name
    columns: HashMap<String, Column>,
    /// Schema: column name -> data type
    schema: BTreeMap<String, DataType>,
    row_count: usize,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Build a dataset from JSON objects, flattening nested keys with dots.
    /// Non-object entries are skipped.
    pub fn from_json_rows(rows: &[serde_json::Value]) -> Self {
        let mut builder = DatasetBuilder::with_capacity(rows.len());
        for row in rows {
            if let Some(obj) = row.as_object() {
                builder.push_row(flatten_json(obj));
            }
        }
        builder.finish()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Get column by name (names are stored lowercased)
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn schema(&self) -> &BTreeMap<String, DataType> {
        &self.schema
    }

    pub fn data_type(&self, name: &str) -> Option<DataType> {
        self.schema.get(name).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.schema.keys().map(|s| s.as_str())
    }

    /// Materialize a row subset. Indices may repeat (sampling with replacement);
    /// string columns share their dictionaries with this dataset.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), col.take(indices)))
            .collect();

        Dataset {
            columns,
            schema: self.schema.clone(),
            row_count: indices.len(),
        }
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        self.columns.values().map(|c| c.memory_usage()).sum()
    }
}

/// Row-at-a-time builder producing an immutable [`Dataset`].
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    columns: HashMap<String, Column>,
    schema: BTreeMap<String, DataType>,
    row_count: usize,
    capacity: usize,
}

impl DatasetBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Append a row. Missing cells become null, new columns are backfilled,
    /// and existing columns are promoted when the merged type widens.
    pub fn push_row(&mut self, row: HashMap<String, Value>) {
        let row: HashMap<String, Value> = row
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();

        // First, ensure all existing columns have a value (possibly null)
        for (name, col) in self.columns.iter_mut() {
            if !row.contains_key(name) {
                col.push(&Value::Null);
            }
        }

        for (name, value) in row {
            let value_type = DataType::from_value(&value);

            match self.columns.get_mut(&name) {
                Some(col) => {
                    let current = self.schema.get(&name).copied().unwrap_or(DataType::Null);
                    let merged = current.merge(&value_type);
                    if merged != current {
                        *col = col.promote(merged);
                        self.schema.insert(name.clone(), merged);
                    }
                    push_as(col, merged, &value);
                }
                None => {
                    // New column - need to backfill with nulls
                    let mut col = Column::with_capacity(value_type, self.capacity);
                    for _ in 0..self.row_count {
                        col.push(&Value::Null);
                    }
                    col.push(&value);
                    self.columns.insert(name.clone(), col);
                    self.schema.insert(name, value_type);
                }
            }
        }

        self.row_count += 1;
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn finish(self) -> Dataset {
        Dataset {
            columns: self.columns,
            schema: self.schema,
            row_count: self.row_count,
        }
    }
}

/// String columns absorb any scalar by its display form
fn push_as(col: &mut Column, data_type: DataType, value: &Value) {
    if data_type == DataType::String && !value.is_null() && value.as_str().is_none() {
        col.push(&Value::String(value.to_string()));
    } else {
        col.push(value);
    }
}
