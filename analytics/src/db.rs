//! Database layer — `PostgreSQL` raw-event store and Redis client
//! construction, grounded on the teacher's `db::mod::create_pool` /
//! `run_migrations` / `create_redis_client`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use gateway_analytics_common::TelemetryRecord;

/// Create the `PostgreSQL` connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;

    info!("connected to PostgreSQL");
    Ok(pool)
}

/// Run pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database migrations completed");
    Ok(())
}

/// Create the Redis client used by the metric cache (C3).
pub async fn create_redis_client(redis_url: &str) -> Result<fred::clients::RedisClient> {
    use fred::prelude::*;

    let config = RedisConfig::from_url(redis_url)?;
    let client = RedisClient::new(config, None, None, None);
    client.connect();
    client.wait_for_connect().await?;

    info!("connected to Redis");
    Ok(client)
}

/// A single raw-event row as read back for the count/top-endpoint queries
/// (C9's `/metrics/rps` and `/metrics/top-endpoints`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EndpointCount {
    pub path: String,
    pub count: i64,
}

/// Insert one batch of records in a single multi-row statement (C2's
/// writer policy). Runtime-checked (`sqlx::QueryBuilder`) rather than the
/// compile-time `query!` macro, since there is no offline cache in this
/// workspace.
pub async fn insert_batch(pool: &PgPool, records: &[TelemetryRecord]) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let mut builder = sqlx::QueryBuilder::new(
        "INSERT INTO telemetry_events (request_id, path, method, status_code, latency_ms, \
         client_id, api_key, upstream_service, route_id, ts, error_type, user_agent, ip_address) ",
    );

    builder.push_values(records, |mut b, r| {
        b.push_bind(&r.request_id)
            .push_bind(&r.path)
            .push_bind(&r.method)
            .push_bind(i32::from(r.status_code))
            .push_bind(i64::try_from(r.latency_ms).unwrap_or(i64::MAX))
            .push_bind(&r.client_id)
            .push_bind(&r.api_key)
            .push_bind(&r.upstream_service)
            .push_bind(&r.route_id)
            .push_bind(r.timestamp)
            .push_bind(&r.error_type)
            .push_bind(&r.user_agent)
            .push_bind(&r.ip_address);
    });

    builder.push(" ON CONFLICT (request_id) DO NOTHING");
    builder.build().execute(pool).await?;
    Ok(())
}

/// Insert a single record, used as the per-record fallback when a batch
/// insert fails on a constraint conflict.
pub async fn insert_one(pool: &PgPool, record: &TelemetryRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO telemetry_events (request_id, path, method, status_code, latency_ms, \
         client_id, api_key, upstream_service, route_id, ts, error_type, user_agent, ip_address) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
         ON CONFLICT (request_id) DO NOTHING",
    )
    .bind(&record.request_id)
    .bind(&record.path)
    .bind(&record.method)
    .bind(i32::from(record.status_code))
    .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
    .bind(&record.client_id)
    .bind(&record.api_key)
    .bind(&record.upstream_service)
    .bind(&record.route_id)
    .bind(record.timestamp)
    .bind(&record.error_type)
    .bind(&record.user_agent)
    .bind(&record.ip_address)
    .execute(pool)
    .await?;
    Ok(())
}

/// Count raw events since `since`, used by `/metrics/rps`.
pub async fn count_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM telemetry_events WHERE ts >= $1")
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Top `limit` paths by raw-event count since `since`, used by
/// `/metrics/top-endpoints`.
pub async fn top_endpoints_since(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<EndpointCount>, sqlx::Error> {
    sqlx::query_as(
        "SELECT path, COUNT(*) AS count FROM telemetry_events WHERE ts >= $1 \
         GROUP BY path ORDER BY count DESC LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}
