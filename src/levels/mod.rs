//! Price level derivation and caching.

pub mod asian;
pub mod cache;
pub mod pivots;

pub use cache::PriceLevelCache;
pub use pivots::{fibonacci_pivots, PivotLevels};
