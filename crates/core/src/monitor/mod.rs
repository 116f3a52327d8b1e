pub mod cadence;
mod engine;
mod state;
pub mod throttle;

pub use cadence::{Direction, MIN_CHECK_INTERVAL_SECS};
pub use engine::{Mode, Monitor};
pub use state::{MonitorState, MonitorStatus, Observation};
