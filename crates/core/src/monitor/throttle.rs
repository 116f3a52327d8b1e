use chrono::{DateTime, Utc};
use chargewatch_notify::Alert;

use super::state::MonitorState;
use crate::battery::BatterySnapshot;
use crate::config::Config;

/// Threshold crossing for the reading's charging direction, if any.
/// Discharging fires at or below the minimum, charging at or above the maximum.
/// `remaining` counts the alerts left in the phase once this one is shown.
pub fn candidate(snapshot: &BatterySnapshot, cfg: &Config, state: &MonitorState) -> Option<Alert> {
    let level = snapshot.capacity;
    let remaining = cfg
        .max_notifications
        .saturating_sub(state.notifications_shown)
        .saturating_sub(1);
    if snapshot.charging {
        (level >= cfg.max_threshold).then_some(Alert::High {
            level,
            threshold: cfg.max_threshold,
            remaining,
        })
    } else {
        (level <= cfg.min_threshold).then_some(Alert::Low {
            level,
            threshold: cfg.min_threshold,
            remaining,
        })
    }
}

/// Quota not exhausted and spacing since the last notification elapsed.
pub fn admits(state: &MonitorState, cfg: &Config, now: DateTime<Utc>) -> bool {
    if state.notifications_shown >= cfg.max_notifications {
        return false;
    }
    match state.last_notification {
        None => true,
        // A clock that went backwards yields a negative delta: not elapsed.
        Some(last) => (now - last)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= cfg.notification_spacing()),
    }
}
