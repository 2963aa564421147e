//! Lot sizing from stop distance, risk percentage and account size.
//!
//! Pip value is converted into the account currency: directly for pairs
//! quoted in it, through the pair's own mid price for pairs based in it,
//! and through an auxiliary conversion instrument for crosses. Designated
//! commodity symbols use a fixed override. Every non-positive intermediate
//! short-circuits to a zero result instead of propagating a division error.

use crate::config::MonitorConfig;
use crate::models::InstrumentSpec;
use crate::services::market_data::MarketDataPort;
use tracing::{debug, warn};

/// Result of a sizing calculation. `zero()` marks an aborted attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedPosition {
    pub lots: f64,
    pub stop_points: i64,
    pub risk_amount: f64,
}

impl SizedPosition {
    pub fn zero() -> Self {
        Self {
            lots: 0.0,
            stop_points: 0,
            risk_amount: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.lots <= 0.0
    }
}

/// Size a position for `symbol` risking `risk_pct` percent of
/// `account_size` over a stop `stop_distance` away in price terms.
pub async fn size_position(
    port: &dyn MarketDataPort,
    config: &MonitorConfig,
    spec: &InstrumentSpec,
    symbol: &str,
    stop_distance: f64,
    risk_pct: f64,
    account_size: f64,
) -> SizedPosition {
    if !spec.is_valid() {
        warn!(symbol, "instrument spec has non-positive fields, skipping sizing");
        return SizedPosition::zero();
    }

    let stop_points = (stop_distance / spec.point) as i64;
    if stop_points <= 0 {
        return SizedPosition::zero();
    }

    let risk_amount = account_size * risk_pct / 100.0;
    if risk_amount <= 0.0 {
        return SizedPosition::zero();
    }

    let Some(pip_value) = pip_value(port, config, spec, symbol).await else {
        return SizedPosition::zero();
    };

    let lots = clamp_lots(spec, pip_value, stop_points, risk_amount);
    if lots <= 0.0 {
        return SizedPosition::zero();
    }

    debug!(
        symbol,
        stop_points,
        pip_value,
        lots,
        risk_amount,
        "position sized"
    );
    SizedPosition {
        lots,
        stop_points,
        risk_amount,
    }
}

/// Value of one point per lot, in the account currency
async fn pip_value(
    port: &dyn MarketDataPort,
    config: &MonitorConfig,
    spec: &InstrumentSpec,
    symbol: &str,
) -> Option<f64> {
    if config.commodity_symbols.iter().any(|s| s == symbol) {
        return positive(spec.contract_size * 0.01);
    }

    let account = config.account_currency.as_str();
    let raw = spec.contract_size * spec.point;

    if spec.profit_currency == account {
        return positive(raw);
    }

    if spec.base_currency == account {
        // Quote the pair itself to bring the value back into the base
        let mid = mid_price(port, symbol).await?;
        return positive(raw / mid);
    }

    // Cross pair: convert through an auxiliary instrument, trying both
    // orderings of the conversion pair.
    let direct = format!("{}{}", spec.profit_currency, account);
    if let Some(mid) = mid_price(port, &direct).await {
        return positive(raw * mid);
    }
    let inverse = format!("{}{}", account, spec.profit_currency);
    if let Some(mid) = mid_price(port, &inverse).await {
        return positive(raw / mid);
    }

    warn!(
        symbol,
        profit_currency = %spec.profit_currency,
        account_currency = account,
        "no conversion instrument found, using unconverted pip value"
    );
    positive(raw)
}

async fn mid_price(port: &dyn MarketDataPort, symbol: &str) -> Option<f64> {
    match port.quote(symbol).await {
        Ok(quote) => {
            let mid = quote.mid();
            (mid > 0.0).then_some(mid)
        }
        Err(_) => None,
    }
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Pure lot arithmetic: raw risk-derived lots floored to the volume step
/// and clamped into the instrument's volume bounds.
pub fn clamp_lots(
    spec: &InstrumentSpec,
    pip_value: f64,
    stop_points: i64,
    risk_amount: f64,
) -> f64 {
    if pip_value <= 0.0 || stop_points <= 0 {
        return 0.0;
    }

    let raw = risk_amount / (stop_points as f64 * pip_value);
    if !raw.is_finite() || raw <= 0.0 {
        return 0.0;
    }

    let stepped = (raw / spec.volume_step).floor() * spec.volume_step;
    stepped.max(spec.volume_min).min(spec.volume_max)
}
