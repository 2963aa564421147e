//! Plain-text formatting of the consolidated batch notification.
//!
//! The section headers are a soft contract: the body is meant for humans,
//! not for machine parsing.

use crate::models::{PatternType, TradeSignal};
use std::fmt::Write;

/// A level close to the current price but not touched by the latest signal
#[derive(Debug, Clone)]
pub struct NearbyLevel {
    pub name: String,
    pub value: f64,
    pub distance_pct: f64,
}

/// One summary-table row per monitored symbol
#[derive(Debug, Clone)]
pub struct SymbolSummary {
    pub symbol: String,
    pub last_signal: Option<TradeSignal>,
    pub nearby_levels: Vec<NearbyLevel>,
}

pub fn signal_subject(signals: &[TradeSignal]) -> String {
    if signals.len() == 1 {
        let s = &signals[0];
        format!("{}: {} pattern detected", s.symbol, s.pattern)
    } else {
        format!("Trade signals: {} new", signals.len())
    }
}

/// Build the full batch notification body: detail blocks for every new
/// signal, then a status row for every monitored symbol.
pub fn consolidated_message(signals: &[TradeSignal], summaries: &[SymbolSummary]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== NEW SIGNALS ({}) ===", signals.len());
    for signal in signals {
        out.push('\n');
        out.push_str(&signal_block(signal));
    }

    let _ = writeln!(out, "\n=== SUMMARY TABLE ===");
    for summary in summaries {
        out.push_str(&summary_row(summary));
        out.push('\n');
    }

    out
}

/// Detail block for one signal. Touched levels are already sorted with
/// weekly references first.
pub fn signal_block(signal: &TradeSignal) -> String {
    let direction = match signal.pattern {
        PatternType::Bull => "BUY",
        PatternType::Bear => "SELL",
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} @ {:.5}",
        signal.symbol, direction, signal.price
    );
    let _ = writeln!(
        out,
        "  bar closed: {}",
        signal.bar_time.format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(
        out,
        "  stop loss: {:.5} | size: {:.2} lots | risk: ${:.2}",
        signal.stop_loss, signal.position_size, signal.risk_amount
    );
    let _ = writeln!(out, "  levels: {}", signal.touched_levels.join(", "));
    out
}

fn summary_row(summary: &SymbolSummary) -> String {
    let status = match &summary.last_signal {
        Some(signal) => format!(
            "{} {}",
            signal.pattern,
            signal.bar_time.format("%Y-%m-%d %H:%M")
        ),
        None => "no signal".to_string(),
    };

    let nearby = if summary.nearby_levels.is_empty() {
        "-".to_string()
    } else {
        summary
            .nearby_levels
            .iter()
            .map(|l| format!("{} ({:.5}, {:.2}%)", l.name, l.value, l.distance_pct * 100.0))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!("{} | {} | near: {}", summary.symbol, status, nearby)
}
