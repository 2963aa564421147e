//! Notification dispatch and message formatting.

pub mod format;
pub mod sink;

pub use sink::{LogSink, NotificationSink, WebhookSink};
