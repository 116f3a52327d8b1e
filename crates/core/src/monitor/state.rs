use std::time::Duration;

use chrono::{DateTime, Utc};

use super::cadence::Direction;
use crate::battery::BatterySnapshot;
use crate::config::Config;

/// What a reading means relative to the previous accepted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First reading since construction. Thresholds are not evaluated.
    First,
    /// The charging flag flipped; the phase quota was reset.
    PhaseChange,
    /// Same charging phase as before.
    SamePhase,
}

/// Per-phase monitoring state. Owned by the monitor, mutated only by `check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub initialized: bool,
    /// Level of the last accepted reading; `None` before the first one.
    pub last_level: Option<u8>,
    pub last_charging: bool,
    /// Notifications delivered since the last charging flip.
    pub notifications_shown: u32,
    /// `None` is the zero timestamp: no notification yet in this phase.
    pub last_notification: Option<DateTime<Utc>>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same level and charging flag as the last accepted reading.
    pub fn is_repeat(&self, snapshot: &BatterySnapshot) -> bool {
        self.initialized
            && self.last_level == Some(snapshot.capacity)
            && self.last_charging == snapshot.charging
    }

    /// Accept a reading and classify it.
    pub fn observe(&mut self, snapshot: &BatterySnapshot) -> Observation {
        self.last_level = Some(snapshot.capacity);
        if !self.initialized {
            self.initialized = true;
            self.last_charging = snapshot.charging;
            return Observation::First;
        }
        if self.last_charging != snapshot.charging {
            self.reset_phase(snapshot.charging);
            return Observation::PhaseChange;
        }
        Observation::SamePhase
    }

    pub fn record_notification(&mut self, now: DateTime<Utc>) {
        self.notifications_shown += 1;
        self.last_notification = Some(now);
    }

    fn reset_phase(&mut self, charging: bool) {
        self.notifications_shown = 0;
        self.last_notification = None;
        self.last_charging = charging;
    }
}

/// Published view of the monitor, refreshed after every check and config change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStatus {
    pub initialized: bool,
    pub level: Option<u8>,
    pub charging: bool,
    pub notifications_shown: u32,
    pub last_notification: Option<DateTime<Utc>>,
    pub check_interval: Duration,
    // limits from the running config
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub max_notifications: u32,
}

impl MonitorStatus {
    pub fn from_state(state: &MonitorState, cfg: &Config) -> Self {
        Self {
            initialized: state.initialized,
            level: state.last_level,
            charging: state.last_charging,
            notifications_shown: state.notifications_shown,
            last_notification: state.last_notification,
            check_interval: Direction::from_charging(state.last_charging).interval(cfg),
            min_threshold: cfg.min_threshold,
            max_threshold: cfg.max_threshold,
            max_notifications: cfg.max_notifications,
        }
    }
}
