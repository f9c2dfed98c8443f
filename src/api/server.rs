use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, load_dataset, query, reload, status, AppState};
use crate::data::ColumnConfig;
use crate::engine::EngineConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub error_tolerance_percent: f64,
    pub seed: Option<u64>,
    /// Default column roles for uploaded datasets
    pub columns: ColumnConfig,
    pub cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            error_tolerance_percent: 1.0,
            seed: None,
            columns: ColumnConfig::new()
                .with_dims(["category"])
                .with_numeric(["amount", "value"])
                .with_distinct(["user_id", "category"]),
            cache_ttl_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Read `AQE_*` environment variables, falling back to defaults for
    /// anything unset or unparsable
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let list = |key: &str| lookup(key).map(|v| ColumnConfig::parse_list(&v));

        let mut columns = defaults.columns.clone();
        if let Some(dims) = list("AQE_DIM_COLS") {
            columns.dim_cols = dims;
        }
        if let Some(numeric) = list("AQE_NUMERIC_COLS") {
            columns.numeric_cols = numeric;
        }
        if let Some(distinct) = list("AQE_DISTINCT_COLS") {
            columns.distinct_cols = distinct;
        }

        Self {
            host: lookup("AQE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "AQE_PORT").unwrap_or(defaults.port),
            error_tolerance_percent: parse_var(&lookup, "AQE_ERROR_TOLERANCE_PERCENT")
                .unwrap_or(defaults.error_tolerance_percent),
            seed: parse_var(&lookup, "AQE_SEED"),
            columns,
            cache_ttl_secs: parse_var(&lookup, "AQE_CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::new(self.error_tolerance_percent);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/dataset", post(load_dataset))
        .route("/reload", post(reload))
        .route("/query", post(query))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(
        config.columns.clone(),
        config.engine_config(),
        Duration::from_secs(config.cache_ttl_secs),
    ));

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting fastaqe server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("fastaqe server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let config = ServerConfig::default();
        let state = Arc::new(AppState::new(
            config.columns.clone(),
            EngineConfig::new(5.0).with_seed(7),
            Duration::from_secs(60),
        ));
        build_router(state)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn rows(n: usize) -> serde_json::Value {
        let rows: Vec<_> = (0..n)
            .map(|i| {
                serde_json::json!({
                    "amount": (i % 100) as f64,
                    "category": (["A", "B", "C", "D"][i % 4]),
                    "user_id": i % 300,
                })
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    #[test]
    fn test_health_check() {
        let app = create_test_app();
        let response = tokio_test::block_on(app.oneshot(get("/health"))).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unconfigured_server() {
        let app = create_test_app();

        let response = app.clone().oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(post_json("/query", serde_json::json!({ "query": "COUNT" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_dataset_and_query() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json("/dataset", serde_json::json!({ "rows": rows(2_000) })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fitted = body_json(response).await;
        assert_eq!(fitted["generation"], 1);
        assert_eq!(fitted["rows"], 2_000);

        let response = app
            .clone()
            .oneshot(post_json(
                "/query",
                serde_json::json!({ "query": "COUNT DISTINCT category" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["approximate"]["technique"], "hyperloglog");
        assert_eq!(body["exact"]["value"], 4.0);
        assert!(body["accuracy_text"].is_string());
        assert_eq!(body["cached"], false);

        let response = app
            .clone()
            .oneshot(post_json(
                "/query",
                serde_json::json!({ "query": "count distinct CATEGORY", "compare": false }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["cached"], true);
        assert!(body.get("exact").is_none());
        assert_eq!(body["approximate"]["query"], "count distinct CATEGORY");

        // A cache hit is timed as a lookup, so the reported speedup compares
        // against this request's own serving time
        let response = app
            .clone()
            .oneshot(post_json(
                "/query",
                serde_json::json!({ "query": "COUNT DISTINCT category" }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["cached"], true);
        let approx_ms = body["approximate"]["elapsed_ms"].as_f64().unwrap();
        let exact_ms = body["exact"]["elapsed_ms"].as_f64().unwrap();
        if let Some(speedup) = body["speedup"].as_f64() {
            assert!((speedup - exact_ms / approx_ms).abs() <= 1e-6 * speedup.max(1.0));
        }

        let response = app.oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["state"], "ready");
        assert_eq!(status["engine"]["total_rows"], 2_000);
    }

    #[tokio::test]
    async fn test_failed_query_returns_bad_request() {
        let app = create_test_app();
        app.clone()
            .oneshot(post_json("/dataset", serde_json::json!({ "rows": rows(500) })))
            .await
            .unwrap();

        let response = app
            .oneshot(post_json("/query", serde_json::json!({ "query": "FOO bar" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["approximate"]["error_kind"], "ParseError");
    }

    #[tokio::test]
    async fn test_reload() {
        let app = create_test_app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/reload",
                serde_json::json!({ "error_tolerance_percent": 2.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        app.clone()
            .oneshot(post_json("/dataset", serde_json::json!({ "rows": rows(1_000) })))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/reload",
                serde_json::json!({ "error_tolerance_percent": 25.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/reload",
                serde_json::json!({ "error_tolerance_percent": 2.0 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["generation"], 2);
        assert_eq!(body["engine"]["error_tolerance_percent"], 2.0);
    }

    #[tokio::test]
    async fn test_failed_fit_keeps_served_engine() {
        let app = create_test_app();
        app.clone()
            .oneshot(post_json("/dataset", serde_json::json!({ "rows": rows(400) })))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/dataset",
                serde_json::json!({ "rows": rows(400), "numeric_cols": ["price"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post_json("/dataset", serde_json::json!({ "rows": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let status = body_json(app.oneshot(get("/status")).await.unwrap()).await;
        assert_eq!(status["generation"], 1);
    }

    #[test]
    fn test_config_from_lookup() {
        let env = HashMap::from([
            ("AQE_PORT", "9090"),
            ("AQE_SEED", "42"),
            ("AQE_NUMERIC_COLS", "Price, qty"),
            ("AQE_ERROR_TOLERANCE_PERCENT", "not-a-number"),
        ]);
        let config = ServerConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, 9090);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.error_tolerance_percent, 1.0);
        assert!(config.columns.numeric_cols.contains("price"));
        assert!(config.columns.numeric_cols.contains("qty"));
        assert!(config.columns.dim_cols.contains("category"));
        assert_eq!(config.engine_config().seed, Some(42));
    }
}
