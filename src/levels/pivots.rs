//! Fibonacci pivot levels derived from a prior period's high/low/close.

use crate::models::{LevelCategory, PriceLevel};
use chrono::NaiveDate;

/// The seven pivot prices for one period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub p: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// P = (H + L + C) / 3, resistances/supports offset by Fibonacci ratios of
/// the period range.
pub fn fibonacci_pivots(high: f64, low: f64, close: f64) -> PivotLevels {
    let p = (high + low + close) / 3.0;
    let range = high - low;

    PivotLevels {
        p,
        r1: p + 0.382 * range,
        r2: p + 0.618 * range,
        r3: p + range,
        s1: p - 0.382 * range,
        s2: p - 0.618 * range,
        s3: p - range,
    }
}

impl PivotLevels {
    /// Materialize as named levels, e.g. `daily_pivot_R1`
    pub fn named(
        &self,
        prefix: &str,
        category: LevelCategory,
        valid_date: NaiveDate,
    ) -> Vec<PriceLevel> {
        [
            ("P", self.p),
            ("R1", self.r1),
            ("R2", self.r2),
            ("R3", self.r3),
            ("S1", self.s1),
            ("S2", self.s2),
            ("S3", self.s3),
        ]
        .into_iter()
        .map(|(suffix, value)| PriceLevel {
            name: format!("{}_pivot_{}", prefix, suffix),
            value,
            category,
            valid_date,
        })
        .collect()
    }
}
