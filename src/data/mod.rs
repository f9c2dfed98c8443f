pub mod column;
pub mod dataset;
pub mod dictionary;
pub mod registry;
pub mod value;

pub use column::{Column, ColumnIter};
pub use dataset::{Dataset, DatasetBuilder};
pub use dictionary::StringDictionary;
pub use registry::{ColumnConfig, ColumnRole};
pub use value::{flatten_json, DataType, Value};
