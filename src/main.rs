//! fastaqe Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - AQE_HOST: Bind address (default: 0.0.0.0)
//! - AQE_PORT: Port number (default: 8080)
//! - AQE_ERROR_TOLERANCE_PERCENT: Error tolerance for fits (default: 1.0)
//! - AQE_SEED: Seed for reproducible sampling (default: unset)
//! - AQE_DIM_COLS: Dimension columns (default: category)
//! - AQE_NUMERIC_COLS: Numeric columns (default: amount,value)
//! - AQE_DISTINCT_COLS: Distinct-count columns (default: user_id,category)
//! - AQE_CACHE_TTL_SECS: Query cache TTL (default: 60)
//! - RUST_LOG: Log level (default: fastaqe=info,tower_http=info)

use fastaqe::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fastaqe=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("fastaqe configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Error tolerance: {}%", config.error_tolerance_percent);
    match config.seed {
        Some(seed) => tracing::info!("  Seed: {}", seed),
        None => tracing::info!("  Seed: entropy"),
    }
    tracing::info!("  Dimension columns: {:?}", config.columns.dim_cols);
    tracing::info!("  Numeric columns: {:?}", config.columns.numeric_cols);
    tracing::info!("  Distinct columns: {:?}", config.columns.distinct_cols);
    tracing::info!("  Query cache TTL: {} seconds", config.cache_ttl_secs);

    println!(
        r#"
  __           _
 / _| __ _ ___| |_ __ _  __ _  ___
| |_ / _` / __| __/ _` |/ _` |/ _ \
|  _| (_| \__ \ || (_| | (_| |  __/
|_|  \__,_|___/\__\__,_|\__, |\___|
                           |_|

 Approximate Query Engine
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
