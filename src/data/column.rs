use super::dictionary::StringDictionary;
use super::value::{DataType, Value};
use std::borrow::Cow;
use std::sync::Arc;

/// Columnar storage for efficient memory usage and cache locality
#[derive(Debug, Clone)]
pub enum Column {
    /// Null column (all values are null)
    Null(usize),
    /// Boolean column
    Bool(Vec<Option<bool>>),
    /// 64-bit integer column
    Int64(Vec<Option<i64>>),
    /// 64-bit floating point column (NaN is stored as missing)
    Float64(Vec<Option<f64>>),
    /// String column with dictionary encoding
    String {
        /// Dictionary IDs (None = null)
        ids: Vec<Option<u32>>,
        /// Dictionary shared with every subset taken from this column
        dictionary: Arc<StringDictionary>,
    },
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Null => Column::Null(0),
            DataType::Bool => Column::Bool(Vec::with_capacity(capacity)),
            DataType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            DataType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            DataType::String => Column::String {
                ids: Vec::with_capacity(capacity),
                dictionary: Arc::new(StringDictionary::new()),
            },
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Null(_) => DataType::Null,
            Column::Bool(_) => DataType::Bool,
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String { .. } => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Null(n) => *n,
            Column::Bool(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::String { ids, .. } => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a value to the column
    pub fn push(&mut self, value: &Value) {
        match (self, value) {
            (Column::Null(n), _) => *n += 1,
            (Column::Bool(v), Value::Bool(b)) => v.push(Some(*b)),
            (Column::Int64(v), Value::Int64(i)) => v.push(Some(*i)),
            (Column::Float64(v), Value::Float64(f)) => {
                v.push(if f.is_nan() { None } else { Some(*f) })
            }
            (Column::Float64(v), Value::Int64(i)) => v.push(Some(*i as f64)),
            (Column::String { ids, dictionary }, Value::String(s)) => {
                let id = Arc::make_mut(dictionary).get_or_insert(s);
                ids.push(Some(id));
            }
            // Nulls and type mismatches are stored as null
            (Column::Bool(v), _) => v.push(None),
            (Column::Int64(v), _) => v.push(None),
            (Column::Float64(v), _) => v.push(None),
            (Column::String { ids, .. }, _) => ids.push(None),
        }
    }

    /// Get value at index
    pub fn get(&self, index: usize) -> Value {
        match self {
            Column::Null(_) => Value::Null,
            Column::Bool(v) => v
                .get(index)
                .and_then(|v| *v)
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            Column::Int64(v) => v
                .get(index)
                .and_then(|v| *v)
                .map(Value::Int64)
                .unwrap_or(Value::Null),
            Column::Float64(v) => v
                .get(index)
                .and_then(|v| *v)
                .map(Value::Float64)
                .unwrap_or(Value::Null),
            Column::String { ids, dictionary } => ids
                .get(index)
                .and_then(|id| *id)
                .and_then(|id| dictionary.get(id))
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
        }
    }

    /// Numeric value at index, `None` for missing or non-numeric cells
    pub fn f64_at(&self, index: usize) -> Option<f64> {
        match self {
            Column::Int64(v) => v.get(index).copied().flatten().map(|i| i as f64),
            Column::Float64(v) => v.get(index).copied().flatten(),
            _ => None,
        }
    }

    /// Stringified value at index, used for grouping and distinct counting.
    /// String columns borrow straight from the dictionary.
    pub fn key_at(&self, index: usize) -> Option<Cow<'_, str>> {
        match self {
            Column::String { ids, dictionary } => ids
                .get(index)
                .copied()
                .flatten()
                .and_then(|id| dictionary.get(id))
                .map(Cow::Borrowed),
            _ => {
                let value = self.get(index);
                if value.is_null() {
                    None
                } else {
                    Some(Cow::Owned(value.to_string()))
                }
            }
        }
    }

    /// Iterate over non-missing numeric values
    pub fn numeric_values(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).filter_map(move |idx| self.f64_at(idx))
    }

    /// Iterate over non-missing stringified values
    pub fn keys(&self) -> impl Iterator<Item = Cow<'_, str>> + '_ {
        (0..self.len()).filter_map(move |idx| self.key_at(idx))
    }

    /// Rebuild this column with a wider type
    pub fn promote(&self, to: DataType) -> Column {
        if self.data_type() == to {
            return self.clone();
        }

        let mut column = Column::with_capacity(to, self.len());
        for value in self.iter() {
            match (&value, to) {
                (Value::Null, _) => column.push(&Value::Null),
                (_, DataType::String) => column.push(&Value::String(value.to_string())),
                _ => column.push(&value),
            }
        }
        column
    }

    /// Materialize the rows at `indices` (repeats allowed) into a new column
    pub fn take(&self, indices: &[usize]) -> Column {
        fn pick<T: Copy>(values: &[Option<T>], indices: &[usize]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|&i| values.get(i).copied().flatten())
                .collect()
        }

        match self {
            Column::Null(_) => Column::Null(indices.len()),
            Column::Bool(v) => Column::Bool(pick(v, indices)),
            Column::Int64(v) => Column::Int64(pick(v, indices)),
            Column::Float64(v) => Column::Float64(pick(v, indices)),
            Column::String { ids, dictionary } => Column::String {
                ids: pick(ids, indices),
                dictionary: Arc::clone(dictionary),
            },
        }
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        match self {
            Column::Null(_) => std::mem::size_of::<usize>(),
            Column::Bool(v) => v.capacity() * std::mem::size_of::<Option<bool>>(),
            Column::Int64(v) => v.capacity() * std::mem::size_of::<Option<i64>>(),
            Column::Float64(v) => v.capacity() * std::mem::size_of::<Option<f64>>(),
            Column::String { ids, dictionary } => {
                ids.capacity() * std::mem::size_of::<Option<u32>>() + dictionary.memory_usage()
            }
        }
    }

    /// Create an iterator over column values
    pub fn iter(&self) -> ColumnIter<'_> {
        ColumnIter {
            column: self,
            index: 0,
        }
    }
}

pub struct ColumnIter<'a> {
    column: &'a Column,
    index: usize,
}

impl<'a> Iterator for ColumnIter<'a> {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.column.len() {
            return None;
        }
        let value = self.column.get(self.index);
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.column.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for ColumnIter<'a> {}
