//! fastaqe: Approximate Query Engine
//!
//! Answers aggregate queries over an in-memory dataset from summaries built
//! once at fit time, instead of scanning every row. A single error tolerance
//! drives the size of every summary.
//!
//! # Features
//!
//! - **HyperLogLog**: `COUNT DISTINCT` on distinct columns
//! - **KLL Sketch**: `MEDIAN` and `QUANTILE` on numeric columns
//! - **Count-Min Sketch**: `GROUPBY` row counts on dimension columns
//! - **Sample Tables**: `COUNT`, `SUM`, `AVG` and `GROUP BY` aggregates from
//!   random, stratified, reservoir or adaptive samples
//! - **Error Bounds**: every answer carries its error characterization and
//!   an explanation of the summary that produced it
//! - **Exact Mode**: ground-truth execution for accuracy comparison
//!
//! # Example
//!
//! ```no_run
//! use fastaqe::data::{ColumnConfig, Dataset};
//! use fastaqe::engine::{Engine, EngineConfig};
//!
//! let rows = vec![serde_json::json!({ "category": "A", "amount": 12.5 })];
//! let dataset = Dataset::from_json_rows(&rows);
//!
//! let columns = ColumnConfig::new()
//!     .with_dims(["category"])
//!     .with_numeric(["amount"])
//!     .with_distinct(["category"]);
//! let engine = Engine::fit(&dataset, columns, EngineConfig::new(1.0)).unwrap();
//!
//! let result = engine.query("SUM amount GROUP BY category");
//! println!("{:?}: {}", result.value(), result.explanation);
//! ```

pub mod accuracy;
pub mod api;
pub mod data;
pub mod engine;
pub mod error;
pub mod query;
pub mod sampling;
pub mod sketch;

// Re-export commonly used types
pub use accuracy::{compare, AccuracyReport};
pub use data::{ColumnConfig, ColumnRole, DataType, Dataset, Value};
pub use engine::{fit, query, Engine, EngineConfig, EngineHandle, SketchParams};
pub use error::{ConfigError, QueryError};
pub use query::{exact_query, ErrorBound, QueryResult, QueryValue};
pub use sampling::SamplingStrategy;
