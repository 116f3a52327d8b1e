pub mod simulator;
pub mod sysfs;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use simulator::{SimPhase, SimulatedSource, Simulator};
pub use sysfs::SysfsSource;

/// One reading of the power source. Produced once per poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatterySnapshot {
    /// Charge level, 0–100.
    pub capacity: u8,
    pub charging: bool,
    /// External power connected.
    pub plugged: bool,
    pub cycle_count: u32,
    /// Design capacity (mWh or mAh, whatever the source reports).
    pub design_capacity: u32,
    /// Current full-charge capacity, same unit as `design_capacity`.
    pub max_capacity: u32,
    pub voltage_mv: i32,
    pub current_ma: i32,
    pub time_to_full_min: u32,
    pub time_to_empty_min: u32,
}

impl BatterySnapshot {
    /// A bare reading carrying only level and charging state.
    pub fn level(capacity: u8, charging: bool) -> Self {
        Self {
            capacity,
            charging,
            plugged: charging,
            ..Self::default()
        }
    }

    /// `max_capacity * 100 / design_capacity`, or 0 when design capacity is unknown.
    pub fn health_percent(&self) -> u32 {
        if self.design_capacity == 0 {
            return 0;
        }
        (u64::from(self.max_capacity) * 100 / u64::from(self.design_capacity)) as u32
    }
}

/// Battery acquisition failure. Never fatal to the monitor.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no battery found: {0}")]
    Unavailable(String),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unparsable value {value:?} in {}", path.display())]
    Parse { path: PathBuf, value: String },
    #[error("invalid reading: {0}")]
    Invalid(String),
}

/// Produces a [`BatterySnapshot`] on demand. Must be safe to call repeatedly.
pub trait BatterySource: Send {
    fn name(&self) -> &str;

    fn poll(&mut self) -> Result<BatterySnapshot, SourceError>;
}
