use std::time::Duration;

use crate::config::Config;

/// Adaptation never shortens an interval below this many seconds.
pub const MIN_CHECK_INTERVAL_SECS: u64 = 10;

/// Which configured interval is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Charging,
    Discharging,
}

impl Direction {
    pub fn from_charging(charging: bool) -> Self {
        if charging { Self::Charging } else { Self::Discharging }
    }

    pub fn interval_secs(self, cfg: &Config) -> u64 {
        match self {
            Self::Charging => cfg.check_interval_charging,
            Self::Discharging => cfg.check_interval_discharging,
        }
    }

    pub fn interval(self, cfg: &Config) -> Duration {
        Duration::from_secs(self.interval_secs(cfg))
    }

    pub fn threshold(self, cfg: &Config) -> u8 {
        match self {
            Self::Charging => cfg.max_threshold,
            Self::Discharging => cfg.min_threshold,
        }
    }

    pub fn set_interval_secs(self, cfg: &mut Config, secs: u64) {
        match self {
            Self::Charging => cfg.check_interval_charging = secs,
            Self::Discharging => cfg.check_interval_discharging = secs,
        }
    }
}

/// Shorten `interval_secs` by `interval / threshold` seconds per percentage
/// point between `level` and `threshold`.
///
/// The result never drops below [`MIN_CHECK_INTERVAL_SECS`] (or the current
/// interval, if that is already lower) and never exceeds the current interval.
/// A zero threshold leaves the interval unchanged.
pub fn adapt(interval_secs: u64, threshold: u8, level: u8) -> u64 {
    if threshold == 0 {
        return interval_secs;
    }
    let unit = interval_secs as f64 / f64::from(threshold);
    let gap = f64::from(level.abs_diff(threshold));
    let shrink = (unit * gap).round() as u64;
    let floor = MIN_CHECK_INTERVAL_SECS.min(interval_secs);
    interval_secs.saturating_sub(shrink).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_picks_interval() {
        let cfg = Config::default();
        assert_eq!(Direction::from_charging(true).interval(&cfg), Duration::from_secs(30));
        assert_eq!(Direction::from_charging(false).interval(&cfg), Duration::from_secs(1800));
        assert_eq!(Direction::Charging.threshold(&cfg), 81);
        assert_eq!(Direction::Discharging.threshold(&cfg), 21);
    }

    #[test]
    fn set_interval_targets_direction() {
        let mut cfg = Config::default();
        Direction::Charging.set_interval_secs(&mut cfg, 12);
        assert_eq!(cfg.check_interval_charging, 12);
        assert_eq!(cfg.check_interval_discharging, 1800);
    }

    #[test]
    fn at_threshold_keeps_interval() {
        assert_eq!(adapt(1800, 21, 21), 1800);
    }

    #[test]
    fn shrinks_proportionally_to_gap() {
        // 1800 / 20 = 90s per point, gap 5 → 450s shorter
        assert_eq!(adapt(1800, 20, 15), 1350);
        // charging side uses the absolute gap too
        assert_eq!(adapt(800, 80, 85), 750);
    }

    #[test]
    fn clamps_to_floor() {
        assert_eq!(adapt(300, 20, 0), MIN_CHECK_INTERVAL_SECS);
        let mut interval = 1800;
        for _ in 0..50 {
            interval = adapt(interval, 21, 5);
        }
        assert_eq!(interval, MIN_CHECK_INTERVAL_SECS);
    }

    #[test]
    fn never_raises_sub_floor_interval() {
        assert_eq!(adapt(4, 20, 10), 4);
    }

    #[test]
    fn zero_threshold_is_ignored() {
        assert_eq!(adapt(600, 0, 0), 600);
    }
}
