//! Analytics service entry point.
//!
//! Startup sequence grounded on the teacher's `main.rs` (tracing init, pool
//! and Redis client construction, router assembly, graceful shutdown) and
//! `db::mod::{create_pool, run_migrations, create_redis_client}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use analytics::cache::MetricCache;
use analytics::config::Config;
use analytics::db;
use analytics::engine::Engine;
use analytics::ingest::{ingest_batch, ingest_single};
use analytics::metrics_api::{aggregated, endpoint, rps, top_endpoints};
use analytics::sink::RawSink;
use analytics::state::AnalyticsState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "analytics=info,tower_http=info".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting analytics service");

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let redis = db::create_redis_client(&config.redis_url).await?;

    let cache = MetricCache::new(redis);
    let engine = Arc::new(Engine::new(cache.clone(), config.metrics_window_seconds));
    let raw_sink = Arc::new(RawSink::new(config.queue_capacity));

    let sink_workers = analytics::sink::spawn_workers(
        raw_sink.clone(),
        pool.clone(),
        config.workers,
        config.batch_size,
        config.batch_flush_interval,
    );

    let sweeper_engine = engine.clone();
    let aggregation_interval = config.metrics_aggregation_interval;
    let sweeper_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(aggregation_interval);
        loop {
            ticker.tick().await;
            sweeper_engine.sweep().await;
        }
    });

    let state = Arc::new(AnalyticsState {
        config: Arc::new(config.clone()),
        db: pool,
        cache,
        engine,
        raw_sink: raw_sink.clone(),
    });

    let app = Router::new()
        .route("/api/v1/telemetry/ingest/batch", post(ingest_batch))
        .route("/api/v1/telemetry/ingest", post(ingest_single))
        .route("/api/v1/metrics/aggregated", get(aggregated))
        .route("/api/v1/metrics/endpoint/{*path}", get(endpoint))
        .route("/api/v1/metrics/rps", get(rps))
        .route("/api/v1/metrics/top-endpoints", get(top_endpoints))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(address = %config.bind_addr, "analytics service listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    // Shutdown order (§5): stop ingest (axum::serve has returned), then
    // drain the raw sink pool (10s) and the sweeper (5s), aborting whatever
    // remains past their bound.
    sweeper_handle.abort();

    raw_sink.shutdown();
    let drain_deadline = Duration::from_secs(10);
    if tokio::time::timeout(drain_deadline, futures::future::join_all(sink_workers))
        .await
        .is_err()
    {
        tracing::warn!("raw sink workers did not drain within 10s, aborting");
    }

    info!("analytics service shutdown complete");
    Ok(())
}
