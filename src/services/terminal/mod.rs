//! Terminal bridge connectivity: shared connection lifecycle and the
//! HTTP adapter that implements the market data port over it.

pub mod bridge;
pub mod connection;

pub use bridge::{BridgeLink, BridgeMarketData};
pub use connection::{SharedTerminal, TerminalGuard, TerminalLink};
