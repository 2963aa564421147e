//! End-to-end monitoring pipeline tests over a mocked market data port

use crate::mock_port::{bar_at, eurusd_spec, ts, CountingSink, MockMarketData};
use pipsentry::config::MonitorConfig;
use pipsentry::levels::PriceLevelCache;
use pipsentry::models::{LevelCategory, LevelSet, PatternType, PriceLevel, Timeframe};
use pipsentry::monitor::worker::{evaluate_closed_bar, run_symbol_monitor, WorkerContext};
use pipsentry::monitor::{Consolidator, SessionManager, SignalStore};
use pipsentry::services::terminal::{SharedTerminal, TerminalLink};
use pipsentry::BoxError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(10),
        error_backoff: Duration::from_millis(10),
        init_retry_delay: Duration::from_millis(10),
        batch_grace: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(500),
        ..MonitorConfig::default()
    }
}

fn reference_levels() -> LevelSet {
    let mut levels = LevelSet::new();
    levels.insert(PriceLevel {
        name: "yesterday_high".to_string(),
        value: 1.1020,
        category: LevelCategory::Daily,
        valid_date: ts(12, 0, 0).date_naive(),
    });
    levels
}

/// Scenario A: bullish engulfing over a touched level emits a sized signal
/// with the stop below the entry
#[tokio::test]
async fn engulfing_over_touched_level_emits_signal() {
    let port = MockMarketData::new();
    let closed = vec![
        bar_at(ts(12, 12, 0), 1.1000, 1.1010, 1.0990, 1.1005),
        bar_at(ts(12, 12, 10), 1.1005, 1.1030, 1.0980, 1.1025),
    ];

    let signal = evaluate_closed_bar(
        &port,
        &MonitorConfig::default(),
        &eurusd_spec(),
        "EURUSD",
        &closed,
        &reference_levels(),
        0.5,
        100_000.0,
    )
    .await
    .expect("signal expected");

    assert_eq!(signal.pattern, PatternType::Bull);
    assert_eq!(signal.touched_levels, vec!["yesterday_high".to_string()]);
    assert_eq!(signal.price, 1.1025);
    assert!(signal.stop_loss < 1.1025);
    // true range = 1.1030 - 1.0980 = 0.0050, stop distance = 0.0075
    assert!((signal.stop_loss - 1.0950).abs() < 1e-9);
    // 75 stop points at $10/point on $500 risk, floored to the 0.01 step
    assert!((signal.position_size - 0.66).abs() < 1e-9);
    assert_eq!(signal.risk_amount, 500.0);
    assert!(!signal.consumed);
}

/// Scenario B: the same pattern with no level nearby emits nothing
#[tokio::test]
async fn pattern_without_touched_level_emits_no_signal() {
    let port = MockMarketData::new();
    let closed = vec![
        bar_at(ts(12, 12, 0), 1.1000, 1.1010, 1.0990, 1.1005),
        bar_at(ts(12, 12, 10), 1.1005, 1.1030, 1.0980, 1.1025),
    ];

    let signal = evaluate_closed_bar(
        &port,
        &MonitorConfig::default(),
        &eurusd_spec(),
        "EURUSD",
        &closed,
        &LevelSet::new(),
        0.5,
        100_000.0,
    )
    .await;
    assert!(signal.is_none());
}

fn seed_daily_levels(port: &MockMarketData, symbol: &str) {
    port.set_bars(
        symbol,
        Timeframe::D1,
        vec![
            // Yesterday's high lands at 1.1020, inside the signal bar range
            bar_at(ts(11, 0, 0), 1.0950, 1.1020, 1.0900, 1.1000),
            bar_at(ts(12, 0, 0), 1.1000, 1.1100, 1.0950, 1.1080),
        ],
    );
}

/// The worker detects the bar close, stores exactly one signal and stops
/// promptly on the broadcast signal
#[tokio::test]
async fn worker_detects_close_and_stores_one_signal() {
    let symbol = "EURUSD";
    let port = Arc::new(MockMarketData::new());
    seed_daily_levels(&port, symbol);
    port.set_bars(
        symbol,
        Timeframe::M10,
        vec![
            bar_at(ts(12, 12, 0), 1.1000, 1.1010, 1.0990, 1.1005),
            bar_at(ts(12, 12, 10), 1.1005, 1.1030, 1.0980, 1.1025),
        ],
    );

    let config = fast_config();
    let store = Arc::new(SignalStore::new(config.history_capacity));
    let cache = Arc::new(PriceLevelCache::new(port.clone(), config.clone()));
    let ctx = Arc::new(WorkerContext {
        port: port.clone(),
        cache,
        store: store.clone(),
        config,
        metrics: None,
        risk_pct: 0.5,
        account_size: 100_000.0,
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = tokio::spawn(run_symbol_monitor(
        ctx,
        symbol.to_string(),
        eurusd_spec(),
        stop_rx,
    ));

    // Nothing closes while the newest bar timestamp stands still
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.total(), 0);

    // A new forming bar appears: the 12:10 bar has closed
    port.push_bar(
        symbol,
        Timeframe::M10,
        bar_at(ts(12, 12, 20), 1.1025, 1.1028, 1.1020, 1.1024),
    );
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.total(), 1);
    let signal = store.latest(symbol).expect("stored signal");
    assert_eq!(signal.bar_time, ts(12, 12, 10));
    assert_eq!(signal.pattern, PatternType::Bull);

    // Further polls with no newer bar stay quiet
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.total(), 1);

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), worker)
        .await
        .expect("worker exits within one polling interval")
        .unwrap();
}

/// A worker with a failing feed keeps retrying and never panics; a healthy
/// worker next to it is unaffected
#[tokio::test]
async fn fetch_failures_stay_contained_to_their_worker() {
    let port = Arc::new(MockMarketData::new());
    seed_daily_levels(&port, "EURUSD");
    port.set_bars(
        "EURUSD",
        Timeframe::M10,
        vec![
            bar_at(ts(12, 12, 0), 1.1000, 1.1010, 1.0990, 1.1005),
            bar_at(ts(12, 12, 10), 1.1005, 1.1030, 1.0980, 1.1025),
        ],
    );
    // GBPUSD has no data at all: its worker loops in initialization

    let config = fast_config();
    let store = Arc::new(SignalStore::new(config.history_capacity));
    let cache = Arc::new(PriceLevelCache::new(port.clone(), config.clone()));
    let ctx = Arc::new(WorkerContext {
        port: port.clone(),
        cache,
        store: store.clone(),
        config,
        metrics: None,
        risk_pct: 0.5,
        account_size: 100_000.0,
    });

    let (stop_tx, stop_rx) = watch::channel(false);
    let healthy = tokio::spawn(run_symbol_monitor(
        ctx.clone(),
        "EURUSD".to_string(),
        eurusd_spec(),
        stop_rx.clone(),
    ));
    let starving = tokio::spawn(run_symbol_monitor(
        ctx,
        "GBPUSD".to_string(),
        eurusd_spec(),
        stop_rx,
    ));

    tokio::time::sleep(Duration::from_millis(60)).await;
    port.push_bar(
        "EURUSD",
        Timeframe::M10,
        bar_at(ts(12, 12, 20), 1.1025, 1.1028, 1.1020, 1.1024),
    );
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.total(), 1);
    assert!(store.latest("GBPUSD").is_none());

    stop_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        healthy.await.unwrap();
        starving.await.unwrap();
    })
    .await
    .expect("both workers exit promptly");
}

/// Batch-window property: signals accumulated inside one window go out as
/// one notification; later signals go into the next one
#[tokio::test]
async fn sweep_batches_all_pending_signals_into_one_notification() {
    let port = Arc::new(MockMarketData::new());
    seed_daily_levels(&port, "EURUSD");
    seed_daily_levels(&port, "GBPUSD");
    port.set_quote("EURUSD", 1.1024, 1.1026);
    port.set_quote("GBPUSD", 1.2650, 1.2652);

    let config = fast_config();
    let store = Arc::new(SignalStore::new(config.history_capacity));
    let cache = Arc::new(PriceLevelCache::new(port.clone(), config.clone()));
    let sink = Arc::new(CountingSink::new());
    let consolidator = Consolidator::new(
        port,
        cache,
        store.clone(),
        sink.clone(),
        config.clone(),
        None,
        vec!["EURUSD".to_string(), "GBPUSD".to_string()],
    )
    .unwrap();

    // Two symbols wrote inside the same window
    store.push(evaluate_signal_fixture("EURUSD"));
    store.push(evaluate_signal_fixture("GBPUSD"));

    assert_eq!(consolidator.sweep().await, 2);
    assert_eq!(sink.count(), 1);
    let (subject, body) = sink.sent.lock().unwrap()[0].clone();
    assert_eq!(subject, "Trade signals: 2 new");
    assert!(body.contains("=== NEW SIGNALS (2) ==="));
    assert!(body.contains("EURUSD BUY"));
    assert!(body.contains("GBPUSD BUY"));
    assert!(body.contains("=== SUMMARY TABLE ==="));

    // Nothing new: the next window is silent
    assert_eq!(consolidator.sweep().await, 0);
    assert_eq!(sink.count(), 1);

    // A signal in a later window gets its own notification
    let mut later = evaluate_signal_fixture("EURUSD");
    later.bar_time = ts(12, 12, 21);
    store.push(later);
    assert_eq!(consolidator.sweep().await, 1);
    assert_eq!(sink.count(), 2);
}

fn evaluate_signal_fixture(symbol: &str) -> pipsentry::models::TradeSignal {
    pipsentry::models::TradeSignal {
        symbol: symbol.to_string(),
        pattern: PatternType::Bull,
        bar_time: ts(12, 12, 10),
        detected_at: ts(12, 12, 10),
        touched_levels: vec!["yesterday_high".to_string()],
        price: 1.1025,
        stop_loss: 1.0950,
        position_size: 1.0,
        risk_amount: 500.0,
        consumed: false,
    }
}

/// Session lifecycle: unreachable symbols are dropped, a second session is
/// rejected, stop tears everything down
#[tokio::test]
async fn session_drops_unknown_symbols_and_rejects_double_start() {
    let port = Arc::new(MockMarketData::new());
    port.set_spec("EURUSD", eurusd_spec());
    port.set_spec("GBPUSD", eurusd_spec());
    seed_daily_levels(&port, "EURUSD");
    seed_daily_levels(&port, "GBPUSD");

    let sink = Arc::new(CountingSink::new());
    let manager = SessionManager::new(port, sink.clone(), fast_config(), None);

    let status = manager
        .start(
            vec![
                "eurusd".to_string(),
                "GBPUSD".to_string(),
                "NOSUCH".to_string(),
            ],
            0.5,
            100_000.0,
        )
        .await
        .expect("session starts with the reachable symbols");
    assert_eq!(
        status.symbols,
        vec!["EURUSD".to_string(), "GBPUSD".to_string()]
    );
    assert!(status.active);

    // Startup notification went out
    assert_eq!(sink.count(), 1);
    assert_eq!(sink.sent.lock().unwrap()[0].0, "Monitoring started");

    let err = manager
        .start(vec!["EURUSD".to_string()], 0.5, 100_000.0)
        .await
        .expect_err("second session must be rejected");
    assert!(err.to_string().contains("already active"));

    assert!(manager.signals().await.is_some());
    assert!(manager.stop().await);
    assert!(!manager.status().await.active);
    assert!(manager.signals().await.is_none());
    assert!(!manager.stop().await);
}

#[tokio::test]
async fn session_with_no_reachable_symbols_fails_to_start() {
    let port = Arc::new(MockMarketData::new());
    let sink = Arc::new(CountingSink::new());
    let manager = SessionManager::new(port, sink, fast_config(), None);

    let err = manager
        .start(vec!["NOSUCH".to_string()], 0.5, 100_000.0)
        .await
        .expect_err("no valid symbols");
    assert!(err.to_string().contains("no valid symbols"));
    assert!(!manager.status().await.active);
}

struct FakeLink {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait::async_trait]
impl TerminalLink for FakeLink {
    async fn connect(&self) -> Result<(), BoxError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Concurrent acquisition initializes the link exactly once; teardown only
/// happens after the last reference is gone
#[tokio::test]
async fn shared_terminal_initializes_once_under_contention() {
    let link = Arc::new(FakeLink {
        connects: AtomicUsize::new(0),
        disconnects: AtomicUsize::new(0),
    });
    let terminal = SharedTerminal::new(link.clone(), Duration::from_secs(300));

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let terminal = terminal.clone();
        tasks.push(tokio::spawn(async move {
            let guard = terminal.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(link.connects.load(Ordering::SeqCst), 1);
    assert_eq!(link.disconnects.load(Ordering::SeqCst), 0);
    assert_eq!(terminal.active_count(), 0);
    assert!(terminal.is_connected().await);

    terminal.shutdown().await;
    assert_eq!(link.disconnects.load(Ordering::SeqCst), 1);
    assert!(!terminal.is_connected().await);

    // The next acquisition reconnects
    let guard = terminal.acquire().await.unwrap();
    assert_eq!(link.connects.load(Ordering::SeqCst), 2);
    drop(guard);
}
