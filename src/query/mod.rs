//! Query language, routing and result types.

pub mod aggregates;
pub mod cache;
pub mod exact;
pub mod parser;
pub mod result;
pub mod router;

pub use cache::{CacheStats, QueryCache};
pub use exact::{exact_query, interpolated_quantile};
pub use parser::{parse_query, AggregateFunction, ParseError, ParsedQuery, QueryShape, Technique};
pub use result::{Answer, ErrorBound, ExactResult, QueryResult, QueryValue, SummaryKind};
