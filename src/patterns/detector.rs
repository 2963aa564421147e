//! Reversal pattern classification and level-touch matching.
//!
//! Two pattern families are recognized on the closed candle:
//!
//! - engulfing: range and close strictly surpass the prior candle in the
//!   pattern's direction
//! - inside-failure candle (IFC): a large-bodied candle closing beyond the
//!   extremes of the prior two candles
//!
//! Engulfing is checked before IFC and bull takes precedence over bear.
//! A pattern only becomes a signal when at least one cached level was
//! touched inside the lookback window.

use crate::models::{Bar, LevelSet, PatternType, PriceLevel};

/// Body-to-range ratio an IFC candle must reach
const IFC_BODY_RATIO: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Candles before the closed one scanned for level touches
    pub lookback: usize,
    /// Near-touch tolerance as a fraction of the candle range
    pub touch_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback: 2,
            touch_threshold: 0.1,
        }
    }
}

/// Classify the last closed candle of `bars`.
///
/// Needs at least two bars for the engulfing checks; the IFC checks are
/// skipped when no third bar exists. Anything shorter yields no pattern.
pub fn classify(bars: &[Bar]) -> Option<PatternType> {
    if bars.len() < 2 {
        return None;
    }

    let current = &bars[bars.len() - 1];
    let prev = &bars[bars.len() - 2];

    let bull_engulfing = current.low < prev.low
        && current.high > prev.high
        && current.close > current.open
        && current.close > prev.close;
    let bear_engulfing = current.high > prev.high
        && current.low < prev.low
        && current.close < current.open
        && current.close < prev.close;

    if bull_engulfing {
        return Some(PatternType::Bull);
    }
    if bear_engulfing {
        return Some(PatternType::Bear);
    }

    let prev2 = if bars.len() >= 3 {
        Some(&bars[bars.len() - 3])
    } else {
        None
    };
    let large_body = current.range() > 0.0 && current.body() / current.range() >= IFC_BODY_RATIO;

    if let Some(prev2) = prev2 {
        let bull_ifc = current.close > prev.high
            && current.close > prev2.high
            && large_body
            && current.close > current.open;
        if bull_ifc {
            return Some(PatternType::Bull);
        }

        let bear_ifc = current.close < prev.low
            && current.close < prev2.low
            && large_body
            && current.close < current.open;
        if bear_ifc {
            return Some(PatternType::Bear);
        }
    }

    None
}

/// Detect a pattern on the last closed candle and collect the levels it
/// touched. Returns the touched level names sorted by category priority
/// (weekly references first), then name.
pub fn detect(
    bars: &[Bar],
    levels: &LevelSet,
    config: &DetectorConfig,
) -> (Option<PatternType>, Vec<String>) {
    let Some(pattern) = classify(bars) else {
        return (None, Vec::new());
    };

    let window = config.lookback + 1;
    let start = bars.len().saturating_sub(window);
    let scanned = &bars[start..];
    let current_index = scanned.len() - 1;

    let mut touched: Vec<&PriceLevel> = levels
        .values()
        .filter(|level| {
            scanned.iter().enumerate().any(|(idx, candle)| {
                touches(candle, level.value, pattern, idx == current_index, config)
            })
        })
        .collect();

    touched.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| a.name.cmp(&b.name))
    });

    (
        Some(pattern),
        touched.into_iter().map(|l| l.name.clone()).collect(),
    )
}

/// Touch rules for one candle:
///
/// - exact: the level lies inside the candle's closed `[low, high]` interval
/// - near: the level sits within `touch_threshold * range` outside the
///   candle, and on the current candle the close must additionally sit on
///   the side of the level the pattern direction implies
fn touches(
    candle: &Bar,
    level: f64,
    pattern: PatternType,
    is_current: bool,
    config: &DetectorConfig,
) -> bool {
    if candle.low <= level && level <= candle.high {
        return true;
    }

    let range = candle.range();
    if range <= 0.0 {
        return false;
    }
    let distance = if level < candle.low {
        candle.low - level
    } else {
        level - candle.high
    };
    if distance > config.touch_threshold * range {
        return false;
    }

    if is_current {
        // A near miss only certifies the signal when the close agrees with
        // the direction; a close on the wrong side contradicts the touch.
        match pattern {
            PatternType::Bull => candle.close > level,
            PatternType::Bear => candle.close < level,
        }
    } else {
        true
    }
}
