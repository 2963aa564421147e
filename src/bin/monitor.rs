//! Headless monitor
//!
//! Starts a monitoring session for the symbols named in the environment and
//! runs until interrupted. Useful on hosts that do not need the API server.

use dotenvy::dotenv;
use pipsentry::config::{self, MonitorConfig};
use pipsentry::logging;
use pipsentry::metrics::Metrics;
use pipsentry::monitor::SessionManager;
use pipsentry::notify::{LogSink, NotificationSink, WebhookSink};
use pipsentry::services::terminal::{BridgeLink, BridgeMarketData, SharedTerminal};
use std::env;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_logging();

    let environment = config::get_environment();
    info!("Starting pipsentry monitor");
    info!(environment = %environment, "Environment");

    let symbols: Vec<String> = env::var("SYMBOLS")
        .unwrap_or_else(|_| "EURUSD,GBPUSD,XAUUSD,USDCHF".to_string())
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    let risk_pct: f64 = env::var("RISK_PERCENTAGE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.5);
    let account_size: f64 = env::var("ACCOUNT_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100_000.0);

    if symbols.is_empty() {
        return Err("SYMBOLS must name at least one symbol".into());
    }
    info!(symbols = ?symbols, risk_pct, account_size, "Monitor configuration");

    let monitor_config = MonitorConfig::from_env();
    let metrics = Arc::new(Metrics::new()?);

    let bridge_url = url::Url::parse(&config::get_bridge_url())?;
    let client = reqwest::Client::builder()
        .timeout(monitor_config.poll_interval)
        .build()?;
    let terminal = SharedTerminal::new(
        Arc::new(BridgeLink::new(bridge_url.clone(), client.clone())),
        monitor_config.idle_timeout,
    );
    let port = Arc::new(BridgeMarketData::new(
        bridge_url,
        client.clone(),
        terminal.clone(),
    ));

    let sink: Arc<dyn NotificationSink> = match config::get_webhook_url() {
        Some(url) => Arc::new(WebhookSink::new(url, client)),
        None => Arc::new(LogSink),
    };

    let session = SessionManager::new(port, sink, monitor_config, Some(metrics));

    let (reaper_stop_tx, reaper_stop_rx) = watch::channel(false);
    let reaper = terminal.spawn_reaper(reaper_stop_rx);

    let status = session
        .start(symbols, risk_pct, account_size)
        .await
        .map_err(|e| format!("failed to start monitoring: {}", e))?;
    info!(symbols = ?status.symbols, "Monitoring started, press Ctrl+C to stop");

    signal::ctrl_c().await?;
    info!("Stopping monitor...");
    session.stop().await;
    let _ = reaper_stop_tx.send(true);
    reaper.abort();
    terminal.shutdown().await;
    info!("Monitor stopped");

    Ok(())
}
