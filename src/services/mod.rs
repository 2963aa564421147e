//! External collaborators: market data access and terminal lifecycle.

pub mod market_data;
pub mod terminal;

pub use market_data::MarketDataPort;
