//! Multi-symbol market monitoring and signal generation engine.
//!
//! Watches a set of instruments on a short timeframe, detects candlestick
//! reversal patterns that coincide with cached daily/weekly/session price
//! levels, sizes the resulting trade by account risk and consolidates signals
//! across symbols into batched notifications.

pub mod config;
pub mod core;
pub mod levels;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod patterns;
pub mod risk;
pub mod services;

/// Boxed error used across service boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
