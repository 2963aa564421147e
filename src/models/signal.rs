use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a detected reversal pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Bull,
    Bear,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternType::Bull => f.write_str("bull"),
            PatternType::Bear => f.write_str("bear"),
        }
    }
}

/// A risk-sized trade signal produced by a symbol worker.
///
/// Created once per qualifying bar close per symbol. Only `consumed` is ever
/// mutated afterwards, and only by the consolidator under the store lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub pattern: PatternType,
    /// Timestamp of the closed bar the pattern fired on
    pub bar_time: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    /// Touched level names, weekly references first
    pub touched_levels: Vec<String>,
    /// Entry reference: close of the signal bar
    pub price: f64,
    pub stop_loss: f64,
    /// Lots, already floored to the volume step and clamped
    pub position_size: f64,
    pub risk_amount: f64,
    /// Set by the consolidator when swept into a batch notification
    pub consumed: bool,
}
