//! Per-symbol monitoring worker.
//!
//! One long-lived task per symbol: poll the working timeframe, detect new
//! bar closes, run pattern detection against the freshest level set and
//! push qualifying risk-sized signals into the shared store. Errors stay
//! inside this worker; a failing symbol never affects the others.

use crate::config::MonitorConfig;
use crate::levels::PriceLevelCache;
use crate::metrics::Metrics;
use crate::models::{Bar, InstrumentSpec, LevelSet, PatternType, Timeframe, TradeSignal};
use crate::monitor::store::SignalStore;
use crate::patterns::{detect, DetectorConfig};
use crate::risk::size_position;
use crate::services::market_data::MarketDataPort;
use crate::BoxError;
use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Multiplier applied to the two-bar true range for the stop distance
const STOP_RANGE_FACTOR: f64 = 1.5;
/// Fallback stop distance as a fraction of price when the range is degenerate
const STOP_FALLBACK_PCT: f64 = 0.01;

/// Shared dependencies handed to every worker of a session
pub struct WorkerContext {
    pub port: Arc<dyn MarketDataPort>,
    pub cache: Arc<PriceLevelCache>,
    pub store: Arc<SignalStore>,
    pub config: MonitorConfig,
    pub metrics: Option<Arc<Metrics>>,
    pub risk_pct: f64,
    pub account_size: f64,
}

/// Run the monitoring loop for one symbol until the stop signal fires.
///
/// The instrument spec was verified at session start and stays fixed for
/// the session's lifetime.
pub async fn run_symbol_monitor(
    ctx: Arc<WorkerContext>,
    symbol: String,
    spec: InstrumentSpec,
    mut stop: watch::Receiver<bool>,
) {
    info!(symbol = %symbol, "symbol monitor started");

    // INITIALIZING: keep retrying the first series fetch instead of dying
    let Some(series) = initial_series(&ctx, &symbol, &mut stop).await else {
        info!(symbol = %symbol, "symbol monitor stopped before initialization");
        return;
    };
    let mut last_seen = series.last().map(|b| b.timestamp);
    debug!(symbol = %symbol, last_seen = ?last_seen, "initial series loaded");

    // POLLING
    loop {
        if sleep_or_stop(&mut stop, ctx.config.poll_interval).await {
            break;
        }

        let bars = match ctx
            .port
            .bars(&symbol, Timeframe::M10, ctx.config.series_depth)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "poll failed, backing off");
                if let Some(metrics) = &ctx.metrics {
                    metrics.poll_errors_total.inc();
                }
                if sleep_or_stop(&mut stop, ctx.config.error_backoff).await {
                    break;
                }
                continue;
            }
        };

        let Some(newest) = bars.last().map(|b| b.timestamp) else {
            continue;
        };
        let is_new = last_seen.map(|seen| newest > seen).unwrap_or(true);
        if !is_new {
            continue;
        }

        // CLOSED_BAR_DETECTED: the newest bar is still forming, the one
        // before it has just closed.
        if bars.len() >= 2 {
            let closed = &bars[..bars.len() - 1];
            let levels = ctx.cache.levels(&symbol).await;
            if let Some(signal) = evaluate_closed_bar(
                ctx.port.as_ref(),
                &ctx.config,
                &spec,
                &symbol,
                closed,
                &levels,
                ctx.risk_pct,
                ctx.account_size,
            )
            .await
            {
                let bar_time = signal.bar_time;
                if ctx.store.push(signal) {
                    info!(symbol = %symbol, bar_time = %bar_time, "signal stored");
                    if let Some(metrics) = &ctx.metrics {
                        metrics.signals_generated_total.inc();
                    }
                } else {
                    debug!(symbol = %symbol, bar_time = %bar_time, "duplicate signal skipped");
                }
            }
        }
        last_seen = Some(newest);
    }

    info!(symbol = %symbol, "symbol monitor stopped");
}

/// Analyze the just-closed bar of `closed` (its last element) and build a
/// risk-sized signal when a pattern fires on at least one touched level.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate_closed_bar(
    port: &dyn MarketDataPort,
    config: &MonitorConfig,
    spec: &InstrumentSpec,
    symbol: &str,
    closed: &[Bar],
    levels: &LevelSet,
    risk_pct: f64,
    account_size: f64,
) -> Option<TradeSignal> {
    let detector = DetectorConfig {
        lookback: config.touch_lookback,
        touch_threshold: config.touch_threshold,
    };
    let (pattern, touched) = detect(closed, levels, &detector);

    let bar = closed.last()?;
    debug!(
        symbol,
        bar_time = %bar.timestamp,
        pattern = ?pattern,
        touched = touched.len(),
        "closed bar analyzed"
    );

    let pattern = pattern?;
    if touched.is_empty() {
        return None;
    }

    let prev = &closed[closed.len() - 2];
    let true_range = bar.high.max(prev.high) - bar.low.min(prev.low);
    let mut stop_distance = STOP_RANGE_FACTOR * true_range;
    if stop_distance <= 0.0 {
        stop_distance = bar.close * STOP_FALLBACK_PCT;
    }

    let entry = bar.close;
    let stop_loss = match pattern {
        PatternType::Bull => entry - stop_distance,
        PatternType::Bear => entry + stop_distance,
    };

    let sized = size_position(
        port,
        config,
        spec,
        symbol,
        stop_distance,
        risk_pct,
        account_size,
    )
    .await;
    if sized.is_zero() {
        warn!(symbol, bar_time = %bar.timestamp, "sizing aborted, signal dropped");
        return None;
    }

    Some(TradeSignal {
        symbol: symbol.to_string(),
        pattern,
        bar_time: bar.timestamp,
        detected_at: Utc::now(),
        touched_levels: touched,
        price: entry,
        stop_loss,
        position_size: sized.lots,
        risk_amount: sized.risk_amount,
        consumed: false,
    })
}

/// Fetch the initial bar series, retrying on a constant backoff until it
/// succeeds or the stop signal fires. Returns `None` only on stop.
async fn initial_series(
    ctx: &WorkerContext,
    symbol: &str,
    stop: &mut watch::Receiver<bool>,
) -> Option<Vec<Bar>> {
    loop {
        if *stop.borrow() {
            return None;
        }

        let fetch = || async {
            ctx.port
                .bars(symbol, Timeframe::M10, ctx.config.series_depth)
                .await
        };
        let result: Result<Vec<Bar>, BoxError> = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(ctx.config.init_retry_delay)
                    .with_max_times(3),
            )
            .notify(|err: &BoxError, dur| {
                warn!(symbol, error = %err, retry_in = ?dur, "initial fetch failed");
            })
            .await;

        match result {
            Ok(bars) if !bars.is_empty() => return Some(bars),
            Ok(_) => {
                warn!(symbol, "no bars available yet, retrying initialization");
            }
            Err(e) => {
                warn!(symbol, error = %e, "initialization exhausted retries, trying again");
            }
        }

        if sleep_or_stop(stop, ctx.config.init_retry_delay).await {
            return None;
        }
    }
}

/// Sleep for `duration` unless the stop signal fires first.
/// Returns `true` when the worker should exit.
async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: std::time::Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = stop.changed() => {}
    }
    *stop.borrow()
}
