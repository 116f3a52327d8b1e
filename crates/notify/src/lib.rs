//! Delivery of user-visible battery alerts.
//!
//! The monitor only sees the [`NotificationSink`] trait; concrete sinks log,
//! shell out to a desktop notifier, or fan out to several sinks at once.

pub mod command;
pub mod log;
pub mod sink;

pub use command::CommandSink;
pub use log::LogSink;
pub use sink::{Alert, MockSink, NotificationSink, NotifyError, NotifyFuture, SinkChain};
