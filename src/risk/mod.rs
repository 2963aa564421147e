//! Risk-based position sizing.

pub mod position;

pub use position::{clamp_lots, size_position, SizedPosition};
