//! API gateway entry point.
//!
//! Grounded on the teacher's `main.rs` startup/shutdown sequence (rustls
//! crypto provider install, `tracing_subscriber` JSON init, graceful
//! shutdown via `ctrl_c()`) and `api::mod::create_router`'s layer-ordering
//! pattern, generalized from the teacher's full chat/voice API surface down
//! to a single catch-all proxy route plus a panic-to-500 safety net.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::routing::any;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use gateway::config::Config;
use gateway::handler::filter_chain;
use gateway::ratelimit::RateLimiter;
use gateway::state::GatewayState;
use gateway::telemetry::TelemetryEmitter;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=info".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting gateway");

    let redis_config = fred::prelude::RedisConfig::from_url(&config.rate_limit_redis_url)?;
    let redis = fred::prelude::RedisClient::new(redis_config, None, None, None);
    redis.connect();
    redis.wait_for_connect().await?;
    let rate_limiter = RateLimiter::new(redis, config.rate_limit_rpm);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let (telemetry, emitter_handle) = TelemetryEmitter::spawn(
        config.analytics_url.clone(),
        config.telemetry_queue_capacity,
        config.telemetry_batch_size,
        config.telemetry_flush_interval,
        http_client.clone(),
    );

    let state = Arc::new(GatewayState {
        config: Arc::new(config.clone()),
        rate_limiter,
        http_client,
        telemetry,
    });

    let app = Router::new()
        .fallback(any(filter_chain))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(address = %config.bind_addr, "gateway listening");

    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, draining telemetry emitter");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    // Shutdown order (§5): stop new requests (axum::serve has already
    // returned), then drain the emitter queue with one last flush, bounded
    // by a 5-second join.
    if tokio::time::timeout(Duration::from_secs(5), emitter_handle)
        .await
        .is_err()
    {
        tracing::warn!("telemetry emitter did not drain within 5s, shutting down anyway");
    }

    info!("gateway shutdown complete");
    Ok(())
}
