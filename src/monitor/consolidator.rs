//! Cross-symbol signal consolidation aligned to bar-close boundaries.
//!
//! A single worker sleeps until the next boundary of the working timeframe
//! (cron schedule on the market clock), gives the symbol workers a short
//! grace period to finish writing, then sweeps the store and dispatches at
//! most one notification covering every new signal. An empty sweep is a
//! normal outcome, not an error.

use crate::config::MonitorConfig;
use crate::levels::PriceLevelCache;
use crate::metrics::Metrics;
use crate::monitor::store::SignalStore;
use crate::notify::format::{consolidated_message, signal_subject, NearbyLevel, SymbolSummary};
use crate::notify::NotificationSink;
use crate::services::market_data::MarketDataPort;
use crate::BoxError;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Consolidator {
    port: Arc<dyn MarketDataPort>,
    cache: Arc<PriceLevelCache>,
    store: Arc<SignalStore>,
    sink: Arc<dyn NotificationSink>,
    config: MonitorConfig,
    metrics: Option<Arc<Metrics>>,
    symbols: Vec<String>,
    schedule: Schedule,
}

impl Consolidator {
    pub fn new(
        port: Arc<dyn MarketDataPort>,
        cache: Arc<PriceLevelCache>,
        store: Arc<SignalStore>,
        sink: Arc<dyn NotificationSink>,
        config: MonitorConfig,
        metrics: Option<Arc<Metrics>>,
        symbols: Vec<String>,
    ) -> Result<Self, BoxError> {
        let schedule = batch_schedule(config.bar_minutes)?;
        Ok(Self {
            port,
            cache,
            store,
            sink,
            config,
            metrics,
            symbols,
            schedule,
        })
    }

    /// Run until the stop signal fires
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(symbols = self.symbols.len(), "consolidator started");

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                // A periodic schedule always has a next tick; bail out
                // rather than spin if it somehow does not.
                warn!("batch schedule exhausted, consolidator exiting");
                return;
            };

            if !sleep_until(next, &mut stop).await {
                break;
            }
            // Let the symbol workers finish writing for this boundary
            tokio::select! {
                _ = tokio::time::sleep(self.config.batch_grace) => {}
                _ = stop.changed() => {}
            }
            if *stop.borrow() {
                break;
            }

            self.sweep().await;
        }

        info!("consolidator stopped");
    }

    /// Sweep unconsumed signals and dispatch one batched notification.
    /// Returns the number of signals included in the dispatch.
    pub async fn sweep(&self) -> usize {
        let swept = self.store.take_unconsumed();
        if swept.is_empty() {
            debug!("no new signals in this batch window");
            return 0;
        }

        let mut summaries = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            summaries.push(self.summarize(symbol).await);
        }

        let subject = signal_subject(&swept);
        let body = consolidated_message(&swept, &summaries);
        match self.sink.notify(&subject, &body).await {
            Ok(()) => {
                info!(signals = swept.len(), "batch notification dispatched");
                if let Some(metrics) = &self.metrics {
                    metrics.notifications_sent_total.inc();
                }
            }
            Err(e) => {
                warn!(error = %e, signals = swept.len(), "batch notification failed");
            }
        }
        swept.len()
    }

    /// Build the summary row for one symbol. Quote and level lookups are
    /// best-effort: a failure degrades the row, never the dispatch.
    async fn summarize(&self, symbol: &str) -> SymbolSummary {
        let last_signal = self.store.latest(symbol);

        let nearby_levels = match self.port.quote(symbol).await {
            Ok(quote) if quote.mid() > 0.0 => {
                let mid = quote.mid();
                let levels = self.cache.levels(symbol).await;
                let touched: &[String] = last_signal
                    .as_ref()
                    .map(|s| s.touched_levels.as_slice())
                    .unwrap_or(&[]);

                let mut nearby: Vec<NearbyLevel> = levels
                    .values()
                    .filter(|level| !touched.contains(&level.name))
                    .filter_map(|level| {
                        let distance_pct = (mid - level.value).abs() / mid;
                        (distance_pct < self.config.proximity_threshold).then(|| NearbyLevel {
                            name: level.name.clone(),
                            value: level.value,
                            distance_pct,
                        })
                    })
                    .collect();
                nearby.sort_by(|a, b| {
                    a.distance_pct
                        .partial_cmp(&b.distance_pct)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                nearby.truncate(3);
                nearby
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!(symbol, error = %e, "quote unavailable for summary row");
                Vec::new()
            }
        };

        SymbolSummary {
            symbol: symbol.to_string(),
            last_signal,
            nearby_levels,
        }
    }
}

/// Cron schedule firing at every bar-close boundary of the working
/// timeframe (minute divisible by the bar length, at second zero).
pub fn batch_schedule(bar_minutes: u32) -> Result<Schedule, BoxError> {
    let expr = format!("0 */{} * * * *", bar_minutes.max(1));
    Schedule::from_str(&expr).map_err(|e| {
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid batch schedule '{}': {}", expr, e),
        )) as BoxError
    })
}

/// Next bar-close boundary strictly after `after`
pub fn next_boundary(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Sleep until `deadline`, returning `false` if the stop signal fired first
async fn sleep_until(deadline: DateTime<Utc>, stop: &mut watch::Receiver<bool>) -> bool {
    let now = Utc::now();
    if deadline > now {
        let wait = (deadline - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = stop.changed() => {}
        }
    }
    !*stop.borrow()
}
