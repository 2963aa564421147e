//! HTTP adapter for the terminal bridge.
//!
//! The bridge is a thin JSON gateway in front of the broker terminal; this
//! adapter implements [`MarketDataPort`] over it and holds a connection
//! guard for the duration of each call.

use crate::models::{Bar, InstrumentSpec, Quote, Timeframe};
use crate::services::market_data::MarketDataPort;
use crate::services::terminal::connection::{SharedTerminal, TerminalLink};
use crate::BoxError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Terminal link that opens and closes a bridge session
pub struct BridgeLink {
    base: Url,
    client: reqwest::Client,
}

impl BridgeLink {
    pub fn new(base: Url, client: reqwest::Client) -> Self {
        Self { base, client }
    }
}

#[async_trait::async_trait]
impl TerminalLink for BridgeLink {
    async fn connect(&self) -> Result<(), BoxError> {
        let url = self.base.join("session")?;
        self.client
            .post(url)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn disconnect(&self) {
        if let Ok(url) = self.base.join("session") {
            // Best effort, the bridge reaps stale sessions on its own
            let _ = self.client.delete(url).send().await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct BarDto {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    /// Bucket start, unix seconds
    time: i64,
}

impl BarDto {
    fn into_bar(self) -> Option<Bar> {
        let timestamp = DateTime::from_timestamp(self.time, 0)?;
        Some(Bar::new(
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            timestamp,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct QuoteDto {
    bid: f64,
    ask: f64,
}

/// Market data port backed by the terminal bridge
pub struct BridgeMarketData {
    base: Url,
    client: reqwest::Client,
    terminal: Arc<SharedTerminal>,
}

impl BridgeMarketData {
    pub fn new(base: Url, client: reqwest::Client, terminal: Arc<SharedTerminal>) -> Self {
        Self {
            base,
            client,
            terminal,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, BoxError> {
        Ok(self.base.join(path)?)
    }

    fn sorted(mut bars: Vec<Bar>) -> Vec<Bar> {
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        bars
    }
}

#[async_trait::async_trait]
impl MarketDataPort for BridgeMarketData {
    async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, BoxError> {
        let _conn = self.terminal.acquire().await?;
        let mut url = self.endpoint("bars")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("timeframe", timeframe.as_str())
            .append_pair("count", &count.to_string());

        let dtos: Vec<BarDto> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(symbol, %timeframe, count = dtos.len(), "fetched bars from bridge");
        Ok(Self::sorted(
            dtos.into_iter().filter_map(BarDto::into_bar).collect(),
        ))
    }

    async fn bars_in_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, BoxError> {
        let _conn = self.terminal.acquire().await?;
        let mut url = self.endpoint("bars_range")?;
        url.query_pairs_mut()
            .append_pair("symbol", symbol)
            .append_pair("timeframe", timeframe.as_str())
            .append_pair("from", &start.timestamp().to_string())
            .append_pair("to", &end.timestamp().to_string());

        let dtos: Vec<BarDto> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Self::sorted(
            dtos.into_iter().filter_map(BarDto::into_bar).collect(),
        ))
    }

    async fn instrument_spec(&self, symbol: &str) -> Result<InstrumentSpec, BoxError> {
        let _conn = self.terminal.acquire().await?;
        let mut url = self.endpoint("symbol_info")?;
        url.query_pairs_mut().append_pair("symbol", symbol);

        let spec: InstrumentSpec = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(spec)
    }

    async fn quote(&self, symbol: &str) -> Result<Quote, BoxError> {
        let _conn = self.terminal.acquire().await?;
        let mut url = self.endpoint("tick")?;
        url.query_pairs_mut().append_pair("symbol", symbol);

        let dto: QuoteDto = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Quote {
            bid: dto.bid,
            ask: dto.ask,
        })
    }
}
