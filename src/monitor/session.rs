//! Session lifecycle: owns the workers, the store and the stop signal.
//!
//! Exactly one monitoring session may be active at a time. All per-session
//! state lives here rather than in module-level globals so restart and test
//! isolation stay straightforward.

use crate::config::MonitorConfig;
use crate::levels::PriceLevelCache;
use crate::metrics::Metrics;
use crate::models::{InstrumentSpec, TradeSignal};
use crate::monitor::consolidator::Consolidator;
use crate::monitor::store::SignalStore;
use crate::monitor::worker::{run_symbol_monitor, WorkerContext};
use crate::notify::NotificationSink;
use crate::services::market_data::MarketDataPort;
use crate::BoxError;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub symbols: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
}

struct ActiveSession {
    symbols: Vec<String>,
    start_time: DateTime<Utc>,
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    store: Arc<SignalStore>,
}

/// Controls the single monitoring session of the process
pub struct SessionManager {
    port: Arc<dyn MarketDataPort>,
    sink: Arc<dyn NotificationSink>,
    config: MonitorConfig,
    metrics: Option<Arc<Metrics>>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(
        port: Arc<dyn MarketDataPort>,
        sink: Arc<dyn NotificationSink>,
        config: MonitorConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            port,
            sink,
            config,
            metrics,
            active: Mutex::new(None),
        }
    }

    /// Start monitoring the requested symbols.
    ///
    /// Symbols whose instrument spec cannot be fetched are dropped with a
    /// warning; the call fails only when a session is already active or no
    /// requested symbol survives verification.
    pub async fn start(
        &self,
        symbols: Vec<String>,
        risk_pct: f64,
        account_size: f64,
    ) -> Result<SessionStatus, BoxError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "monitoring session already active",
            )));
        }

        let specs = self.verify_symbols(&symbols).await;
        if specs.is_empty() {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no valid symbols to monitor",
            )));
        }
        let mut accepted: Vec<String> = specs.keys().cloned().collect();
        accepted.sort();

        let start_time = Utc::now();
        info!(
            symbols = ?accepted,
            risk_pct,
            account_size,
            "starting monitoring session"
        );
        self.send_start_notification(&accepted, risk_pct, account_size)
            .await;

        let store = Arc::new(SignalStore::new(self.config.history_capacity));
        let cache = Arc::new(PriceLevelCache::new(
            self.port.clone(),
            self.config.clone(),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        let ctx = Arc::new(WorkerContext {
            port: self.port.clone(),
            cache: cache.clone(),
            store: store.clone(),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            risk_pct,
            account_size,
        });

        let mut handles = Vec::with_capacity(accepted.len() + 1);
        for symbol in &accepted {
            handles.push(tokio::spawn(run_symbol_monitor(
                ctx.clone(),
                symbol.clone(),
                specs[symbol].clone(),
                stop_rx.clone(),
            )));
        }

        let consolidator = Consolidator::new(
            self.port.clone(),
            cache,
            store.clone(),
            self.sink.clone(),
            self.config.clone(),
            self.metrics.clone(),
            accepted.clone(),
        )?;
        handles.push(tokio::spawn(consolidator.run(stop_rx)));

        *active = Some(ActiveSession {
            symbols: accepted.clone(),
            start_time,
            stop_tx,
            handles,
            store,
        });

        Ok(SessionStatus {
            active: true,
            symbols: accepted,
            start_time: Some(start_time),
        })
    }

    /// Stop the active session. Waits a bounded grace period for workers to
    /// exit, then abandons the stragglers. Returns `false` when no session
    /// was running.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;
        let Some(mut session) = active.take() else {
            return false;
        };

        info!(symbols = ?session.symbols, "stopping monitoring session");
        let _ = session.stop_tx.send(true);

        let joined = tokio::time::timeout(
            self.config.shutdown_grace,
            join_all(session.handles.iter_mut()),
        )
        .await;
        if joined.is_err() {
            warn!("workers did not exit within the grace period, aborting");
            for handle in &session.handles {
                handle.abort();
            }
        }

        info!("monitoring session stopped");
        true
    }

    pub async fn status(&self) -> SessionStatus {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(session) => SessionStatus {
                active: true,
                symbols: session.symbols.clone(),
                start_time: Some(session.start_time),
            },
            None => SessionStatus {
                active: false,
                symbols: Vec::new(),
                start_time: None,
            },
        }
    }

    /// Snapshot of the signal history, or `None` when no session is active
    pub async fn signals(&self) -> Option<HashMap<String, Vec<TradeSignal>>> {
        let active = self.active.lock().await;
        active.as_ref().map(|session| session.store.snapshot())
    }

    pub fn port(&self) -> Arc<dyn MarketDataPort> {
        self.port.clone()
    }

    pub fn sink(&self) -> Arc<dyn NotificationSink> {
        self.sink.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Resolve instrument specs, dropping symbols the terminal does not know
    async fn verify_symbols(&self, symbols: &[String]) -> HashMap<String, InstrumentSpec> {
        let mut specs = HashMap::new();
        for symbol in symbols {
            let symbol = symbol.trim().to_uppercase();
            if symbol.is_empty() || specs.contains_key(&symbol) {
                continue;
            }
            match self.port.instrument_spec(&symbol).await {
                Ok(spec) => {
                    specs.insert(symbol, spec);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "symbol unavailable, skipping");
                }
            }
        }
        specs
    }

    async fn send_start_notification(&self, symbols: &[String], risk_pct: f64, account_size: f64) {
        let body = format!(
            "Monitoring symbols: {}\nRisk: {}% per trade on ${:.2} account",
            symbols.join(", "),
            risk_pct,
            account_size
        );
        if let Err(e) = self.sink.notify("Monitoring started", &body).await {
            warn!(error = %e, "startup notification failed");
        }
    }
}
