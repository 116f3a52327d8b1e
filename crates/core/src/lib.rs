//! Battery threshold monitoring: readings in, throttled alerts out.
//!
//! A [`monitor::Monitor`] polls a [`battery::BatterySource`] on an interval
//! that depends on the charging direction, raises low/high alerts through a
//! `chargewatch_notify::NotificationSink`, and picks up config edits from a
//! [`watcher::ConfigWatcher`].

pub mod battery;
pub mod config;
pub mod monitor;
pub mod shutdown;
pub mod watcher;
