//! Per-symbol price level cache with new-bar invalidation.
//!
//! Three categories are tracked independently: daily references + daily
//! pivots, weekly references + weekly pivots, and the Asian session range.
//! A category recomputes only when its underlying timeframe produced a new
//! bar (or, for the session, a new calendar day past the ready hour) and is
//! otherwise served from cache. On upstream failure the last known-good
//! category is returned instead of failing the whole call.

use crate::config::MonitorConfig;
use crate::levels::asian::{session_range, session_window};
use crate::levels::pivots::fibonacci_pivots;
use crate::models::{Bar, LevelCategory, LevelSet, PriceLevel, Timeframe};
use crate::services::market_data::MarketDataPort;
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One refresh cycle's worth of levels for a single category.
/// Replaced wholesale, never patched, so the keys of a category always come
/// from the same pair of source bars.
struct CategorySnapshot {
    /// Newest upstream bar timestamp (daily/weekly) or the session day marker
    source: DateTime<Utc>,
    levels: Vec<PriceLevel>,
}

#[derive(Default)]
struct SymbolLevels {
    daily: Option<CategorySnapshot>,
    weekly: Option<CategorySnapshot>,
    asian: Option<CategorySnapshot>,
}

/// Caches reference levels per symbol for the lifetime of a session
pub struct PriceLevelCache {
    port: Arc<dyn MarketDataPort>,
    config: MonitorConfig,
    entries: Mutex<HashMap<String, Arc<Mutex<SymbolLevels>>>>,
}

impl PriceLevelCache {
    pub fn new(port: Arc<dyn MarketDataPort>, config: MonitorConfig) -> Self {
        Self {
            port,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Merged level set for a symbol, refreshing stale categories first
    pub async fn levels(&self, symbol: &str) -> LevelSet {
        self.levels_at(symbol, Utc::now()).await
    }

    /// Same as [`levels`](Self::levels) with an explicit clock, so session
    /// withholding can be exercised under test
    pub async fn levels_at(&self, symbol: &str, now: DateTime<Utc>) -> LevelSet {
        let slot = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SymbolLevels::default())))
                .clone()
        };

        // Per-symbol lock: one symbol's slow refresh never blocks another's
        let mut slot = slot.lock().await;
        self.refresh_daily(symbol, &mut slot).await;
        self.refresh_weekly(symbol, &mut slot).await;
        self.refresh_asian(symbol, &mut slot, now).await;

        let mut merged = LevelSet::new();
        if let Some(snapshot) = &slot.daily {
            merged.extend(snapshot.levels.iter().cloned());
        }
        if let Some(snapshot) = &slot.weekly {
            merged.extend(snapshot.levels.iter().cloned());
        }
        if session_complete(now, self.config.asian_ready_hour) {
            if let Some(snapshot) = &slot.asian {
                merged.extend(snapshot.levels.iter().cloned());
            }
        }
        merged
    }

    async fn refresh_daily(&self, symbol: &str, slot: &mut SymbolLevels) {
        match self.port.bars(symbol, Timeframe::D1, 2).await {
            Ok(bars) if bars.len() >= 2 => {
                let newest = bars[bars.len() - 1].timestamp;
                let fresh = slot
                    .daily
                    .as_ref()
                    .map(|s| newest <= s.source)
                    .unwrap_or(false);
                if fresh {
                    return;
                }
                slot.daily = Some(daily_snapshot(&bars[bars.len() - 2], &bars[bars.len() - 1]));
                debug!(symbol, bar_time = %newest, "daily levels recomputed");
            }
            Ok(_) => {
                warn!(symbol, "not enough daily bars for reference levels");
            }
            Err(e) => {
                warn!(symbol, error = %e, "daily level refresh failed, serving last known set");
            }
        }
    }

    async fn refresh_weekly(&self, symbol: &str, slot: &mut SymbolLevels) {
        match self.port.bars(symbol, Timeframe::W1, 3).await {
            Ok(bars) if bars.len() >= 2 => {
                let newest = bars[bars.len() - 1].timestamp;
                let fresh = slot
                    .weekly
                    .as_ref()
                    .map(|s| newest <= s.source)
                    .unwrap_or(false);
                if fresh {
                    return;
                }
                // The newest weekly bar is still forming; levels come from
                // the most recent completed week.
                slot.weekly = Some(weekly_snapshot(&bars[bars.len() - 2], newest));
                debug!(symbol, bar_time = %newest, "weekly levels recomputed");
            }
            Ok(_) => {
                warn!(symbol, "not enough weekly bars for reference levels");
            }
            Err(e) => {
                warn!(symbol, error = %e, "weekly level refresh failed, serving last known set");
            }
        }
    }

    async fn refresh_asian(
        &self,
        symbol: &str,
        slot: &mut SymbolLevels,
        now: DateTime<Utc>,
    ) {
        if !session_complete(now, self.config.asian_ready_hour) {
            return;
        }

        let date = now.date_naive();
        let Some(marker) = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc()) else {
            return;
        };
        let current = slot
            .asian
            .as_ref()
            .map(|s| s.source >= marker)
            .unwrap_or(false);
        if current {
            return;
        }

        let Some((start, end)) = session_window(
            date,
            self.config.asian_start_hour,
            self.config.asian_end_hour,
        ) else {
            return;
        };

        match self
            .port
            .bars_in_range(symbol, Timeframe::H1, start, end)
            .await
        {
            Ok(bars) => match session_range(&bars) {
                Some(range) => {
                    let levels = [
                        ("asian_high", range.high),
                        ("asian_low", range.low),
                        ("asian_mid", range.mid),
                    ]
                    .into_iter()
                    .map(|(name, value)| PriceLevel {
                        name: name.to_string(),
                        value,
                        category: LevelCategory::AsianSession,
                        valid_date: date,
                    })
                    .collect();
                    slot.asian = Some(CategorySnapshot {
                        source: marker,
                        levels,
                    });
                    debug!(symbol, %date, "asian session levels recomputed");
                }
                None => {
                    warn!(symbol, %date, "no bars in asian session window");
                }
            },
            Err(e) => {
                warn!(symbol, error = %e, "asian level refresh failed, serving last known set");
            }
        }
    }
}

fn session_complete(now: DateTime<Utc>, ready_hour: u32) -> bool {
    now.hour() >= ready_hour
}

fn daily_snapshot(yesterday: &Bar, today: &Bar) -> CategorySnapshot {
    let valid_date = today.timestamp.date_naive();
    let reference = |name: &str, value: f64| PriceLevel {
        name: name.to_string(),
        value,
        category: LevelCategory::Daily,
        valid_date,
    };

    let mut levels = vec![
        reference("today_open", today.open),
        reference("yesterday_open", yesterday.open),
        reference("yesterday_high", yesterday.high),
        reference("yesterday_low", yesterday.low),
        reference("yesterday_close", yesterday.close),
    ];
    levels.extend(
        fibonacci_pivots(yesterday.high, yesterday.low, yesterday.close).named(
            "daily",
            LevelCategory::DailyPivot,
            valid_date,
        ),
    );

    CategorySnapshot {
        source: today.timestamp,
        levels,
    }
}

fn weekly_snapshot(completed_week: &Bar, newest: DateTime<Utc>) -> CategorySnapshot {
    let valid_date = completed_week.timestamp.date_naive();
    let reference = |name: &str, value: f64| PriceLevel {
        name: name.to_string(),
        value,
        category: LevelCategory::Weekly,
        valid_date,
    };

    let mut levels = vec![
        reference("prev_week_high", completed_week.high),
        reference("prev_week_low", completed_week.low),
    ];
    levels.extend(
        fibonacci_pivots(
            completed_week.high,
            completed_week.low,
            completed_week.close,
        )
        .named("weekly", LevelCategory::WeeklyPivot, valid_date),
    );

    CategorySnapshot {
        source: newest,
        levels,
    }
}
