//! Asian session range levels.
//!
//! The session spans a fixed wall-clock window that crosses midnight
//! (default 20:00 of the previous day to 02:00 of the target day, terminal
//! clock). Levels for a day become available only after the configured
//! ready hour.

use crate::models::Bar;
use chrono::{DateTime, Days, NaiveDate, Utc};

/// Session boundaries for levels valid on `date`
pub fn session_window(
    date: NaiveDate,
    start_hour: u32,
    end_hour: u32,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = date
        .checked_sub_days(Days::new(1))?
        .and_hms_opt(start_hour, 0, 0)?
        .and_utc();
    let end = date.and_hms_opt(end_hour, 0, 0)?.and_utc();
    Some((start, end))
}

/// High/low/mid of the session computed from hourly bars inside the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRange {
    pub high: f64,
    pub low: f64,
    pub mid: f64,
}

pub fn session_range(bars: &[Bar]) -> Option<SessionRange> {
    if bars.is_empty() {
        return None;
    }

    let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    Some(SessionRange {
        high,
        low,
        mid: (high + low) / 2.0,
    })
}
