//! Market data port consumed by the monitoring pipeline.

use crate::models::{Bar, InstrumentSpec, Quote, Timeframe};
use crate::BoxError;
use chrono::{DateTime, Utc};

/// Source of bar series, quotes and instrument specifications.
///
/// Implementations are expected to return within the polling interval or
/// fail; callers treat every error as transient and contain it to the
/// worker that observed it.
#[async_trait::async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest `count` bars for a symbol/timeframe, oldest first.
    /// The newest bar may still be forming.
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, BoxError>;

    /// Bars whose bucket start falls inside `[start, end]`, oldest first
    async fn bars_in_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BoxError>;

    /// Contract specification for a symbol
    async fn instrument_spec(&self, symbol: &str) -> Result<InstrumentSpec, BoxError>;

    /// Current bid/ask
    async fn quote(&self, symbol: &str) -> Result<Quote, BoxError>;
}
