//! Monitoring API server
//!
//! Hosts the HTTP control surface in front of the monitoring engine.
//! Sessions are started and stopped through the API; the engine talks to
//! the broker terminal through the configured bridge.

use dotenvy::dotenv;
use pipsentry::config::{self, MonitorConfig};
use pipsentry::core::http::{create_router, AppState};
use pipsentry::logging;
use pipsentry::metrics::Metrics;
use pipsentry::monitor::SessionManager;
use pipsentry::notify::{LogSink, NotificationSink, WebhookSink};
use pipsentry::services::terminal::{BridgeLink, BridgeMarketData, SharedTerminal};
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let environment = config::get_environment();
    info!("Starting pipsentry server");
    info!(environment = %environment, "Environment");

    let monitor_config = MonitorConfig::from_env();
    let metrics = Arc::new(Metrics::new()?);

    let bridge_url = Url::parse(&config::get_bridge_url())?;
    info!(bridge = %bridge_url, "Terminal bridge configured");

    // External calls must come back within the polling interval or count
    // as failed
    let client = reqwest::Client::builder()
        .timeout(monitor_config.poll_interval)
        .build()?;
    let terminal = SharedTerminal::new(
        Arc::new(BridgeLink::new(bridge_url.clone(), client.clone())),
        monitor_config.idle_timeout,
    );
    let port_impl = Arc::new(BridgeMarketData::new(
        bridge_url,
        client.clone(),
        terminal.clone(),
    ));

    let sink: Arc<dyn NotificationSink> = match config::get_webhook_url() {
        Some(url) => {
            info!(webhook = %url, "Webhook notifications enabled");
            Arc::new(WebhookSink::new(url, client))
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set, notifications go to the log only");
            Arc::new(LogSink)
        }
    };

    let session = Arc::new(SessionManager::new(
        port_impl,
        sink,
        monitor_config,
        Some(metrics.clone()),
    ));

    // Idle reaper for the shared terminal connection
    let (reaper_stop_tx, reaper_stop_rx) = watch::channel(false);
    let reaper = terminal.spawn_reaper(reaper_stop_rx);

    let state = AppState {
        session: session.clone(),
        metrics,
        start_time: Arc::new(Instant::now()),
    };

    let http_port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port)).await?;
    info!(port = http_port, "HTTP server listening on port {}", http_port);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("Shutting down server...");
        }
    }

    session.stop().await;
    let _ = reaper_stop_tx.send(true);
    reaper.abort();
    terminal.shutdown().await;
    info!("Server stopped");

    Ok(())
}
