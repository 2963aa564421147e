//! Multi-symbol monitoring: per-symbol workers, the shared signal store,
//! the batch consolidator and the session manager that owns them.

pub mod consolidator;
pub mod session;
pub mod store;
pub mod worker;

pub use consolidator::Consolidator;
pub use session::{SessionManager, SessionStatus};
pub use store::SignalStore;
