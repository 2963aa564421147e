//! HTTP control surface using Axum

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::config::MonitorConfig;
use crate::levels::PriceLevelCache;
use crate::metrics::Metrics;
use crate::models::Timeframe;
use crate::monitor::worker::evaluate_closed_bar;
use crate::monitor::SessionManager;
use crate::patterns::{detect, DetectorConfig};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub metrics: Arc<Metrics>,
    pub start_time: Arc<Instant>,
}

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let status = state.session.status().await;
    let uptime_seconds = state.start_time.elapsed().as_secs();
    Ok(Json(json!({
        "status": "ok",
        "uptime_seconds": uptime_seconds,
        "monitoring_active": status.active,
        "service": "pipsentry-monitor"
    })))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .export()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Middleware to track HTTP request metrics
async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    state.metrics.http_requests_in_flight.inc();
    let response = next.run(request).await;
    state.metrics.http_requests_in_flight.dec();

    let status = response.status();
    let duration = start.elapsed();
    state.metrics.http_requests_total.inc();
    state
        .metrics
        .http_request_duration_seconds
        .observe(duration.as_secs_f64());

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status,
            duration_ms = duration.as_millis(),
            "HTTP request error"
        );
    }

    response
}

fn default_risk_pct() -> f64 {
    0.5
}

fn default_account_size() -> f64 {
    100_000.0
}

#[derive(Debug, Deserialize)]
struct StartMonitorRequest {
    symbols: Vec<String>,
    #[serde(default = "default_risk_pct")]
    risk_percentage: f64,
    #[serde(default = "default_account_size")]
    account_size: f64,
}

/// Start a monitoring session for a list of symbols
async fn start_monitoring(
    State(state): State<AppState>,
    Json(request): Json<StartMonitorRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if request.symbols.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "at least one symbol is required".to_string(),
        ));
    }

    let status = state
        .session
        .start(
            request.symbols,
            request.risk_percentage,
            request.account_size,
        )
        .await
        .map_err(|e| {
            error!(error = %e, "failed to start monitoring");
            if e.to_string().contains("already active") {
                (StatusCode::CONFLICT, e.to_string())
            } else {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
        })?;

    Ok(Json(json!(status)))
}

/// Stop the active monitoring session
async fn stop_monitoring(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if state.session.stop().await {
        Ok(Json(json!({ "message": "monitoring stopped" })))
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            "monitoring is not active".to_string(),
        ))
    }
}

/// Current session status
async fn monitor_status(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    let status = state.session.status().await;
    Ok(Json(json!(status)))
}

/// Signal history snapshot for every monitored symbol
async fn monitor_signals(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    match state.session.signals().await {
        Some(signals) => Ok(Json(json!(signals))),
        None => Err((
            StatusCode::BAD_REQUEST,
            "monitoring is not active".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    symbol: String,
    #[serde(default = "default_risk_pct")]
    risk_percentage: f64,
    #[serde(default = "default_account_size")]
    account_size: f64,
}

/// One-shot analysis of a symbol through the same detection and sizing
/// pipeline the workers run
async fn analyze_symbol(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let symbol = request.symbol.trim().to_uppercase();
    let port = state.session.port();
    let config: MonitorConfig = state.session.config().clone();

    let spec = port.instrument_spec(&symbol).await.map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            format!("symbol '{}' unavailable: {}", symbol, e),
        )
    })?;
    let bars = port
        .bars(&symbol, Timeframe::M10, config.series_depth)
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("could not fetch bars for '{}': {}", symbol, e),
            )
        })?;
    if bars.len() < 2 {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("not enough bars for '{}'", symbol),
        ));
    }

    let cache = PriceLevelCache::new(port.clone(), config.clone());
    let levels = cache.levels(&symbol).await;

    // Analyze the most recent closed bar, the newest one is still forming
    let closed = &bars[..bars.len() - 1];
    let detector = DetectorConfig {
        lookback: config.touch_lookback,
        touch_threshold: config.touch_threshold,
    };
    let (pattern, touched) = detect(closed, &levels, &detector);

    let mut result = json!({
        "symbol": symbol,
        "candle_type": pattern.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
        "touch_levels": touched,
        "price_levels": &levels,
    });

    if let Some(signal) = evaluate_closed_bar(
        port.as_ref(),
        &config,
        &spec,
        &symbol,
        closed,
        &levels,
        request.risk_percentage,
        request.account_size,
    )
    .await
    {
        result["trade_recommendation"] = json!({
            "direction": match signal.pattern {
                crate::models::PatternType::Bull => "BUY",
                crate::models::PatternType::Bear => "SELL",
            },
            "entry_price": signal.price,
            "stop_loss": signal.stop_loss,
            "position_size": signal.position_size,
            "risk_amount": signal.risk_amount,
        });
    }

    Ok(Json(result))
}

/// Dispatch a test message through the configured sink
async fn test_notification(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .session
        .sink()
        .notify(
            "Notification test",
            "This is a test notification from the monitoring service.",
        )
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("notification failed: {}", e),
            )
        })?;
    Ok(Json(json!({ "status": "success" })))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/monitor/start", post(start_monitoring))
        .route("/monitor/stop", post(stop_monitoring))
        .route("/monitor/status", get(monitor_status))
        .route("/monitor/signals", get(monitor_signals))
        .route("/data/analyze", post(analyze_symbol))
        .route("/notification/test", post(test_notification))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), crate::BoxError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!(port = port, "HTTP server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
