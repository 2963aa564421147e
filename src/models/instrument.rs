use serde::{Deserialize, Serialize};

/// Contract specification for a tradable instrument.
///
/// Sourced from the terminal bridge once per symbol and cached for the
/// session duration; read-only after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Smallest price increment expressed as a price (e.g. 0.0001)
    pub point: f64,
    /// Quote precision in decimal digits
    pub digits: u32,
    /// Units per 1.0 lot
    pub contract_size: f64,
    pub tick_value: f64,
    pub tick_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
    /// Base currency of the pair (EUR in EURUSD)
    pub base_currency: String,
    /// Currency profit is denominated in (USD in EURUSD)
    pub profit_currency: String,
}

impl InstrumentSpec {
    /// A spec is usable for sizing only when every numeric field is positive
    pub fn is_valid(&self) -> bool {
        self.point > 0.0
            && self.contract_size > 0.0
            && self.tick_value > 0.0
            && self.tick_size > 0.0
            && self.volume_min > 0.0
            && self.volume_max > 0.0
            && self.volume_step > 0.0
    }
}
