// Main entry point for the manga bubble translation service

use manga_translator::{
    core::{Config, ProviderId, TranslationRequest, TranslationResult},
    middleware::{HealthChecker, KeyRecord, ProbeReport},
    orchestration::{DispatchState, Dispatcher},
    services::translation::default_registry,
    utils::Metrics,
};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthChecker>,
    metrics: Metrics,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "manga_translator={}",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== MANGA BUBBLE TRANSLATOR ===");
    info!(
        "Config: target={} batch={}..{} concurrency={} timeout={:?}",
        config.target_language(),
        config.batch.min_batch,
        config.batch.max_batch,
        config.dispatch.max_concurrent_calls,
        config.dispatch.call_timeout
    );

    // Initialize metrics
    let metrics = Metrics::new();

    info!("Loading keys and cache...");
    let state = Arc::new(DispatchState::init(&config, Some(metrics.clone())).await?);
    let providers = default_registry(&config.providers)?;

    let health = Arc::new(
        HealthChecker::new(state.keys.clone(), providers.clone(), &config.health).with_metrics(metrics.clone()),
    );
    let periodic = health.clone().spawn_periodic(config.health.check_interval);

    let dispatcher = Arc::new(Dispatcher::new(&config, state.clone(), providers, Some(metrics.clone())));
    let app_state = AppState {
        dispatcher,
        health,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_endpoint))
        .route("/health/api-keys", get(health_api_keys))
        .route("/health/probe", post(probe_keys))
        .route("/health/recover", post(recover_keys))
        .route("/translate", post(translate))
        .route("/keys", post(add_key))
        .route("/keys/:name", delete(remove_key))
        .route("/keys/:name/toggle", post(toggle_key))
        .route("/keys/reset-daily", post(reset_daily))
        .route("/keys/reset-failed", post(reset_failed))
        .route("/cache/stats", get(cache_stats))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .with_state(app_state)
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET    /                   - Root endpoint");
    info!("  GET    /health             - Health check");
    info!("  POST   /translate          - Translate a batch of bubble texts");
    info!("  GET    /health/api-keys    - Key status and circuit breakers");
    info!("  POST   /health/probe       - Probe every key");
    info!("  POST   /health/recover     - Re-probe inactive keys");
    info!("  POST   /keys               - Add a key");
    info!("  DELETE /keys/:name         - Remove a key");
    info!("  POST   /keys/:name/toggle  - Enable or disable a key");
    info!("  POST   /keys/reset-daily   - Reset daily usage");
    info!("  POST   /keys/reset-failed  - Reactivate every inactive key");
    info!("  GET    /cache/stats        - Translation cache statistics");
    info!("  GET    /metrics            - Prometheus metrics");
    info!("  GET    /stats              - Detailed statistics");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = periodic {
        handle.abort();
    }
    info!("Shutting down, flushing keys and cache");
    state.flush().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn root() -> &'static str {
    "Manga Bubble Translator - Rust Version"
}

async fn health_endpoint() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Serialize)]
struct TranslateResponse {
    results: Vec<TranslationResult>,
}

/// Translate endpoint
///
/// # Request Format:
/// - `{"texts": [...], "source_lang": "ja", "context": {...}, "preferred_method": "..."}`
///
/// # Response:
/// - `{"results": [{"text", "method_used", "cache_hit"}]}`, one per input, in order
async fn translate(
    State(state): State<AppState>,
    Json(request): Json<TranslationRequest>,
) -> Json<TranslateResponse> {
    info!("Received translate request with {} texts", request.texts.len());
    let results = state.dispatcher.translate_batch(&request).await;
    Json(TranslateResponse { results })
}

/// Key status, counts per provider and breaker state
async fn health_api_keys(State(state): State<AppState>) -> Json<serde_json::Value> {
    let keys = state.dispatcher.state().keys.status();
    let active = keys.iter().filter(|k| k.is_active && !k.disabled).count();
    let revoked = keys.iter().filter(|k| k.revoked).count();
    let disabled = keys.iter().filter(|k| k.disabled).count();

    let per_provider: serde_json::Map<String, serde_json::Value> = ProviderId::ALL
        .iter()
        .map(|p| {
            let total = keys.iter().filter(|k| k.provider == *p).count();
            let active = keys.iter().filter(|k| k.provider == *p && k.is_active && !k.disabled).count();
            (
                p.as_str().to_string(),
                serde_json::json!({ "total": total, "active": active }),
            )
        })
        .collect();

    let status = if active == 0 {
        "unhealthy"
    } else if active < keys.len() {
        "degraded"
    } else {
        "healthy"
    };

    Json(serde_json::json!({
        "status": status,
        "total_keys": keys.len(),
        "active_keys": active,
        "inactive_keys": keys.len() - active,
        "revoked_keys": revoked,
        "disabled_keys": disabled,
        "providers": per_provider,
        "circuit_breakers": state.dispatcher.breakers().stats(),
        "keys": keys,
    }))
}

async fn probe_keys(State(state): State<AppState>) -> Json<Vec<ProbeReport>> {
    Json(state.health.probe_all().await)
}

async fn recover_keys(State(state): State<AppState>) -> Json<serde_json::Value> {
    let recovered = state.health.recover_failed().await;
    Json(serde_json::json!({ "recovered": recovered }))
}

#[derive(Deserialize)]
struct NewKey {
    name: String,
    provider: ProviderId,
    #[serde(alias = "key")]
    credential: String,
    daily_limit: Option<u32>,
}

async fn add_key(
    State(state): State<AppState>,
    Json(new_key): Json<NewKey>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let record = KeyRecord::new(
        new_key.provider,
        new_key.name,
        new_key.credential,
        new_key.daily_limit.unwrap_or(1000),
    );
    let id = state
        .dispatcher
        .state()
        .keys
        .add_key(record)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn remove_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state
        .dispatcher
        .state()
        .keys
        .remove_key(&name)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(serde_json::json!({ "removed": removed.name })))
}

async fn toggle_key(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let enabled = state
        .dispatcher
        .state()
        .keys
        .toggle_key(&name)
        .map_err(|e| (StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(serde_json::json!({ "name": name, "enabled": enabled })))
}

async fn reset_daily(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.dispatcher.state().keys.reset_daily();
    Json(serde_json::json!({ "status": "ok" }))
}

async fn reset_failed(State(state): State<AppState>) -> Json<serde_json::Value> {
    let reactivated = state.dispatcher.state().keys.reset_failed();
    state.dispatcher.breakers().reset_all();
    Json(serde_json::json!({ "reactivated": reactivated }))
}

async fn cache_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.dispatcher.state().cache.stats();
    Json(serde_json::json!(stats))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        error!("Failed to serialize metrics: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}
