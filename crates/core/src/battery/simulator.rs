//! Deterministic synthetic battery used to drive every monitor trigger path.
//!
//! The simulator ramps the charge level toward a threshold, then pulses it
//! around that threshold until the monitor reports its notification quota as
//! exhausted, and only then flips the charging state. Its progress therefore
//! depends on the monitor's throttle state, which it reads every step.

use tokio::sync::watch;

use super::{BatterySnapshot, BatterySource, SourceError};
use crate::config::Config;
use crate::monitor::MonitorStatus;

/// Charge change per step, in percentage points.
pub const SIM_STEP: u8 = 2;
/// Level the default simulator starts from (discharging).
pub const SIM_START_CAPACITY: u8 = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimPhase {
    RampingDown,
    HoldingAtMin,
    RampingUp,
    HoldingAtMax,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    capacity: u8,
    charging: bool,
    phase: SimPhase,
    min_threshold: u8,
    max_threshold: u8,
    max_notifications: u32,
}

impl Simulator {
    pub fn new(
        start_capacity: u8,
        charging: bool,
        min_threshold: u8,
        max_threshold: u8,
        max_notifications: u32,
    ) -> Self {
        Self {
            capacity: start_capacity.min(100),
            charging,
            phase: if charging {
                SimPhase::RampingUp
            } else {
                SimPhase::RampingDown
            },
            min_threshold,
            max_threshold,
            max_notifications,
        }
    }

    /// Discharging from [`SIM_START_CAPACITY`] with the config's thresholds and quota.
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            SIM_START_CAPACITY,
            false,
            cfg.min_threshold,
            cfg.max_threshold,
            cfg.max_notifications,
        )
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn capacity(&self) -> u8 {
        self.capacity
    }

    pub fn charging(&self) -> bool {
        self.charging
    }

    /// Follow new thresholds and quota. Takes effect on the next step.
    pub fn retarget(&mut self, min_threshold: u8, max_threshold: u8, max_notifications: u32) {
        if (self.min_threshold, self.max_threshold, self.max_notifications)
            != (min_threshold, max_threshold, max_notifications)
        {
            tracing::debug!(min_threshold, max_threshold, max_notifications, "simulator retargeted");
            self.min_threshold = min_threshold;
            self.max_threshold = max_threshold;
            self.max_notifications = max_notifications;
        }
    }

    /// Advance one step. `notifications_shown` is the monitor's live count
    /// for the current charging phase.
    pub fn next_snapshot(&mut self, notifications_shown: u32) -> BatterySnapshot {
        let step = i32::from(SIM_STEP);
        let min = i32::from(self.min_threshold);
        let max = i32::from(self.max_threshold);
        let mut level = i32::from(self.capacity);

        match self.phase {
            SimPhase::RampingDown => {
                level -= step;
                if level <= min {
                    tracing::debug!(level, "simulator reached minimum threshold");
                    self.phase = SimPhase::HoldingAtMin;
                }
            }
            SimPhase::HoldingAtMin => {
                if notifications_shown >= self.max_notifications {
                    tracing::debug!(notifications_shown, "quota exhausted, simulator starts charging");
                    self.charging = true;
                    self.phase = SimPhase::RampingUp;
                    level = max - step;
                } else {
                    let below = (min - step).max(0);
                    level = if level == min { below } else { min };
                }
            }
            SimPhase::RampingUp => {
                level += step;
                if level >= max {
                    tracing::debug!(level, "simulator reached maximum threshold");
                    self.phase = SimPhase::HoldingAtMax;
                }
            }
            SimPhase::HoldingAtMax => {
                if notifications_shown >= self.max_notifications {
                    tracing::debug!(notifications_shown, "quota exhausted, simulator starts discharging");
                    self.charging = false;
                    self.phase = SimPhase::RampingDown;
                    level = min + step;
                } else {
                    let above = (max + step).min(100);
                    level = if level == max { above } else { max };
                }
            }
        }

        self.capacity = level.clamp(0, 100) as u8;
        self.snapshot()
    }

    fn snapshot(&self) -> BatterySnapshot {
        let remaining = u32::from(self.capacity);
        BatterySnapshot {
            capacity: self.capacity,
            charging: self.charging,
            plugged: self.charging,
            cycle_count: 321,
            design_capacity: 8_694,
            max_capacity: 7_910,
            voltage_mv: 12_600,
            current_ma: if self.charging { 2_100 } else { -1_450 },
            time_to_full_min: if self.charging { (100 - remaining) * 2 } else { 0 },
            time_to_empty_min: if self.charging { 0 } else { remaining * 5 },
        }
    }
}

/// A [`BatterySource`] backed by the [`Simulator`], fed by the monitor's status channel.
/// Thresholds and quota follow the monitor's running config on every poll.
pub struct SimulatedSource {
    simulator: Simulator,
    status: watch::Receiver<MonitorStatus>,
}

impl SimulatedSource {
    pub fn new(simulator: Simulator, status: watch::Receiver<MonitorStatus>) -> Self {
        Self { simulator, status }
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }
}

impl BatterySource for SimulatedSource {
    fn name(&self) -> &str {
        "simulator"
    }

    fn poll(&mut self) -> Result<BatterySnapshot, SourceError> {
        let (shown, min, max, quota) = {
            let status = self.status.borrow();
            (
                status.notifications_shown,
                status.min_threshold,
                status.max_threshold,
                status.max_notifications,
            )
        };
        self.simulator.retarget(min, max, quota);
        Ok(self.simulator.next_snapshot(shown))
    }
}
