use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::accuracy::{compare, AccuracyReport};
use crate::data::{ColumnConfig, DataType, Dataset};
use crate::engine::{EngineConfig, EngineHandle, EngineState, EngineStats, Snapshot};
use crate::error::ConfigError;
use crate::query::{exact_query, parse_query, CacheStats, ExactResult, QueryCache, QueryResult};
use crate::sampling::SamplingStrategy;

/// Tolerance accepted by `/reload`, in percent
const RELOAD_TOLERANCE_RANGE: (f64, f64) = (0.1, 10.0);

/// Cached query results per server
const CACHE_CAPACITY: u64 = 10_000;

/// Application state shared across handlers
pub struct AppState {
    pub handle: EngineHandle,
    pub cache: QueryCache,
    /// Column roles used when a dataset upload names none
    pub columns: ColumnConfig,
    /// Fit configuration used when a request does not override it
    pub config: EngineConfig,
}

impl AppState {
    pub fn new(columns: ColumnConfig, config: EngineConfig, cache_ttl: Duration) -> Self {
        Self {
            handle: EngineHandle::new(),
            cache: QueryCache::with_config(CACHE_CAPACITY, cache_ttl),
            columns,
            config,
        }
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct StatusResponse {
    pub state: EngineState,
    pub generation: u64,
    pub engine: EngineStats,
    pub schema: BTreeMap<String, DataType>,
    pub cache: CacheStats,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let snapshot = state.handle.snapshot().ok_or_else(not_configured)?;

    Ok(Json(StatusResponse {
        state: state.handle.state(),
        generation: snapshot.generation,
        engine: snapshot.engine.stats(),
        schema: snapshot.engine.schema().clone(),
        cache: state.cache.stats(),
    }))
}

// ============================================================================
// Dataset upload and reload
// ============================================================================

#[derive(Deserialize)]
pub struct DatasetRequest {
    pub rows: Vec<serde_json::Value>,
    #[serde(default)]
    pub error_tolerance_percent: Option<f64>,
    #[serde(default)]
    pub dim_cols: Option<Vec<String>>,
    #[serde(default)]
    pub numeric_cols: Option<Vec<String>>,
    #[serde(default)]
    pub distinct_cols: Option<Vec<String>>,
    #[serde(default)]
    pub sample_strategies: Option<Vec<SamplingStrategy>>,
}

impl DatasetRequest {
    /// Explicit roles are used as given and validated strictly. Without
    /// them the server defaults apply, limited to columns the upload has.
    fn column_config(&self, defaults: &ColumnConfig, schema: &BTreeMap<String, DataType>) -> ColumnConfig {
        let explicit =
            self.dim_cols.is_some() || self.numeric_cols.is_some() || self.distinct_cols.is_some();
        if !explicit {
            return defaults.restrict_to(schema);
        }
        ColumnConfig::new()
            .with_dims(self.dim_cols.iter().flatten())
            .with_numeric(self.numeric_cols.iter().flatten())
            .with_distinct(self.distinct_cols.iter().flatten())
    }
}

#[derive(Serialize)]
pub struct FitResponse {
    pub generation: u64,
    pub rows: usize,
    pub columns: ColumnConfig,
    pub engine: EngineStats,
}

impl From<&Snapshot> for FitResponse {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            generation: snapshot.generation,
            rows: snapshot.dataset.row_count(),
            columns: snapshot.engine.columns().clone(),
            engine: snapshot.engine.stats(),
        }
    }
}

pub async fn load_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DatasetRequest>,
) -> Result<Json<FitResponse>, ApiError> {
    let dataset = Dataset::from_json_rows(&request.rows);
    let columns = request.column_config(&state.columns, dataset.schema());

    let mut config = state.config.clone();
    if let Some(percent) = request.error_tolerance_percent {
        config = config.with_tolerance_percent(percent);
    }
    if let Some(strategies) = request.sample_strategies {
        config = config.with_strategies(strategies);
    }

    tracing::info!(rows = dataset.row_count(), "Dataset uploaded");
    let dataset = Arc::new(dataset);
    let snapshot = fit_blocking(&state, move |handle| handle.refit(dataset, columns, config)).await?;
    Ok(Json(FitResponse::from(snapshot.as_ref())))
}

#[derive(Deserialize)]
pub struct ReloadRequest {
    pub error_tolerance_percent: f64,
}

pub async fn reload(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReloadRequest>,
) -> Result<Json<FitResponse>, ApiError> {
    let percent = request.error_tolerance_percent;
    let (low, high) = RELOAD_TOLERANCE_RANGE;
    if !(low..=high).contains(&percent) {
        return Err(ApiError::BadRequest(format!(
            "error_tolerance_percent {} is outside [{}, {}]",
            percent, low, high
        )));
    }
    if state.handle.snapshot().is_none() {
        return Err(not_configured());
    }

    let snapshot = fit_blocking(&state, move |handle| handle.reload_tolerance(percent)).await?;
    Ok(Json(FitResponse::from(snapshot.as_ref())))
}

/// Run a fit off the async runtime, then drop cache entries of older engines
async fn fit_blocking<F>(state: &Arc<AppState>, fit: F) -> Result<Arc<Snapshot>, ApiError>
where
    F: FnOnce(&EngineHandle) -> Result<Arc<Snapshot>, ConfigError> + Send + 'static,
{
    let worker_state = Arc::clone(state);
    let snapshot = tokio::task::spawn_blocking(move || fit(&worker_state.handle))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state.cache.retain_generation(snapshot.generation);
    Ok(snapshot)
}

// ============================================================================
// Query
// ============================================================================

fn default_compare() -> bool {
    true
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_compare")]
    pub compare: bool,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub generation: u64,
    pub cached: bool,
    pub approximate: QueryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<ExactResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<AccuracyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_text: Option<String>,
    /// Exact time divided by approximate time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,
}

pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.handle.snapshot().ok_or_else(not_configured)?;
    let generation = snapshot.generation;

    let start = Instant::now();
    let parsed = parse_query(&request.query).ok();
    let cached = parsed
        .as_ref()
        .and_then(|p| state.cache.get(generation, p));
    let (approximate, cached) = match cached {
        Some(mut hit) => {
            // Report this request's text and serving time, not the original computation's
            hit.query = request.query.clone();
            hit.elapsed = start.elapsed();
            (hit, true)
        }
        None => {
            let result = snapshot.engine.query(&request.query);
            if let Some(p) = &parsed {
                state.cache.put(generation, p, result.clone());
            }
            tracing::debug!(
                query = %request.query,
                ok = result.is_ok(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "Served query"
            );
            (result, false)
        }
    };

    let mut response = QueryResponse {
        generation,
        cached,
        exact: None,
        exact_error: None,
        accuracy: None,
        accuracy_text: None,
        speedup: None,
        approximate,
    };

    if !response.approximate.is_ok() {
        return Ok((StatusCode::BAD_REQUEST, Json(response)));
    }

    if request.compare {
        let dataset = Arc::clone(&snapshot.dataset);
        let text = request.query.clone();
        let exact = tokio::task::spawn_blocking(move || exact_query(&dataset, &text))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match exact {
            Ok(exact) => {
                if let Some(value) = response.approximate.value() {
                    let report = compare(value, &exact.value);
                    response.accuracy_text = Some(report.to_string());
                    response.accuracy = Some(report);
                }
                let approx_ms = response.approximate.elapsed_ms();
                if approx_ms > 0.0 {
                    response.speedup = Some(exact.elapsed.as_secs_f64() * 1000.0 / approx_ms);
                }
                response.exact = Some(exact);
            }
            Err(e) => response.exact_error = Some(e.to_string()),
        }
    }

    Ok((StatusCode::OK, Json(response)))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

fn not_configured() -> ApiError {
    ApiError::Unavailable("no dataset has been loaded; POST /dataset first".into())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_column_config_defaults_restricted_to_schema() {
        let request: DatasetRequest =
            serde_json::from_value(serde_json::json!({ "rows": [{"amount": 1, "category": "A"}] }))
                .unwrap();
        let dataset = Dataset::from_json_rows(&request.rows);
        let defaults = ColumnConfig::new()
            .with_dims(["category"])
            .with_numeric(["amount", "value"])
            .with_distinct(["user_id", "category"]);

        let columns = request.column_config(&defaults, dataset.schema());
        assert_eq!(columns.numeric_cols, BTreeSet::from(["amount".to_string()]));
        assert_eq!(columns.distinct_cols, BTreeSet::from(["category".to_string()]));
    }

    #[test]
    fn test_column_config_explicit_roles() {
        let request: DatasetRequest = serde_json::from_value(serde_json::json!({
            "rows": [],
            "numeric_cols": ["Price"]
        }))
        .unwrap();
        let columns = request.column_config(&ColumnConfig::default(), &BTreeMap::new());
        assert_eq!(columns.numeric_cols, BTreeSet::from(["price".to_string()]));
        assert!(columns.dim_cols.is_empty());
    }
}
