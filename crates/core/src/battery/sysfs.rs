use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::{BatterySnapshot, BatterySource, SourceError};

pub const DEFAULT_ROOT: &str = "/sys/class/power_supply";

/// Reads the first battery found under a power-supply directory.
#[derive(Debug, Clone)]
pub struct SysfsSource {
    name: String,
    battery: PathBuf,
    adapters: Vec<PathBuf>,
}

impl SysfsSource {
    /// Discover a battery under [`DEFAULT_ROOT`].
    pub fn discover() -> Result<Self, SourceError> {
        Self::discover_in(DEFAULT_ROOT)
    }

    /// Discover a battery under `root`. Supplies are scanned in name order.
    pub fn discover_in(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        let entries = fs::read_dir(root)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", root.display())))?;

        let mut supplies: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        supplies.sort();

        let mut battery = None;
        let mut adapters = Vec::new();
        for supply in supplies {
            match supply_kind(&supply) {
                SupplyKind::Battery if battery.is_none() => battery = Some(supply),
                SupplyKind::Adapter => adapters.push(supply),
                _ => {}
            }
        }

        let battery = battery.ok_or_else(|| {
            SourceError::Unavailable(format!("no battery under {}", root.display()))
        })?;
        let name = battery
            .file_name()
            .map(|n| format!("sysfs:{}", n.to_string_lossy()))
            .unwrap_or_else(|| "sysfs".to_string());

        Ok(Self {
            name,
            battery,
            adapters,
        })
    }

    fn plugged(&self, status: &str) -> Result<bool, SourceError> {
        if self.adapters.is_empty() {
            return Ok(matches!(status, "Charging" | "Full" | "Not charging"));
        }
        for adapter in &self.adapters {
            if read_num::<u8>(adapter, "online")?.unwrap_or(0) == 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl BatterySource for SysfsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Result<BatterySnapshot, SourceError> {
        let dir = &self.battery;
        let capacity: u32 = read_num(dir, "capacity")?
            .ok_or_else(|| SourceError::Invalid("battery reports no capacity".into()))?;
        if capacity > 100 {
            return Err(SourceError::Invalid(format!("capacity {capacity}% out of range")));
        }

        let status = read_trimmed(&dir.join("status"))?.unwrap_or_default();
        let plugged = self.plugged(&status)?;
        // On the charger but held at full or at a charge limit: the high threshold applies.
        let charging =
            status == "Charging" || (plugged && matches!(status.as_str(), "Full" | "Not charging"));

        let design = first_num::<u64>(dir, &["energy_full_design", "charge_full_design"])?;
        let full = first_num::<u64>(dir, &["energy_full", "charge_full"])?;
        let voltage_uv = read_num::<i64>(dir, "voltage_now")?.unwrap_or(0);
        let current_ua = read_num::<i64>(dir, "current_now")?.unwrap_or(0);
        let to_full_s = read_num::<u64>(dir, "time_to_full_now")?.unwrap_or(0);
        let to_empty_s = read_num::<u64>(dir, "time_to_empty_now")?.unwrap_or(0);

        Ok(BatterySnapshot {
            capacity: capacity as u8,
            charging,
            plugged,
            cycle_count: read_num(dir, "cycle_count")?.unwrap_or(0),
            design_capacity: micro_to_milli(design),
            max_capacity: micro_to_milli(full),
            voltage_mv: (voltage_uv / 1000) as i32,
            current_ma: (current_ua / 1000) as i32,
            time_to_full_min: (to_full_s / 60) as u32,
            time_to_empty_min: (to_empty_s / 60) as u32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupplyKind {
    Battery,
    Adapter,
    Other,
}

fn supply_kind(dir: &Path) -> SupplyKind {
    let declared = fs::read_to_string(dir.join("type")).ok();
    match declared.as_deref().map(str::trim) {
        Some("Battery") => SupplyKind::Battery,
        Some("Mains") => SupplyKind::Adapter,
        Some(_) => SupplyKind::Other,
        None => {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with("BAT") {
                SupplyKind::Battery
            } else if name.starts_with("AC") || name.starts_with("ADP") {
                SupplyKind::Adapter
            } else {
                SupplyKind::Other
            }
        }
    }
}

/// Read and trim an attribute file. A missing attribute is `None`.
fn read_trimmed(path: &Path) -> Result<Option<String>, SourceError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn read_num<T: FromStr>(dir: &Path, attr: &str) -> Result<Option<T>, SourceError> {
    let path = dir.join(attr);
    match read_trimmed(&path)? {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| SourceError::Parse { path, value }),
    }
}

/// First attribute of `attrs` present in `dir`, or 0.
fn first_num<T: FromStr + Default>(dir: &Path, attrs: &[&str]) -> Result<T, SourceError> {
    for attr in attrs {
        if let Some(v) = read_num(dir, attr)? {
            return Ok(v);
        }
    }
    Ok(T::default())
}

fn micro_to_milli(v: u64) -> u32 {
    u32::try_from(v / 1000).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_attrs(dir: &Path, attrs: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in attrs {
            fs::write(dir.join(name), format!("{value}\n")).unwrap();
        }
    }

    fn laptop(root: &Path, status: &str, online: &str) {
        write_attrs(
            &root.join("AC"),
            &[("type", "Mains"), ("online", online)],
        );
        write_attrs(
            &root.join("BAT0"),
            &[
                ("type", "Battery"),
                ("capacity", "64"),
                ("status", status),
                ("cycle_count", "212"),
                ("energy_full_design", "57000000"),
                ("energy_full", "51300000"),
                ("voltage_now", "12450000"),
                ("current_now", "1530000"),
                ("time_to_empty_now", "7260"),
            ],
        );
    }

    #[test]
    fn reads_discharging_battery() {
        let root = tempfile::tempdir().unwrap();
        laptop(root.path(), "Discharging", "0");

        let mut source = SysfsSource::discover_in(root.path()).unwrap();
        assert_eq!(source.name(), "sysfs:BAT0");
        let snap = source.poll().unwrap();
        assert_eq!(snap.capacity, 64);
        assert!(!snap.charging);
        assert!(!snap.plugged);
        assert_eq!(snap.cycle_count, 212);
        assert_eq!(snap.design_capacity, 57_000);
        assert_eq!(snap.max_capacity, 51_300);
        assert_eq!(snap.health_percent(), 90);
        assert_eq!(snap.voltage_mv, 12_450);
        assert_eq!(snap.current_ma, 1_530);
        assert_eq!(snap.time_to_empty_min, 121);
        assert_eq!(snap.time_to_full_min, 0);
    }

    #[test]
    fn full_on_charger_counts_as_charging() {
        let root = tempfile::tempdir().unwrap();
        laptop(root.path(), "Full", "1");

        let snap = SysfsSource::discover_in(root.path()).unwrap().poll().unwrap();
        assert!(snap.plugged);
        assert!(snap.charging);
    }

    #[test]
    fn charge_limit_on_charger_counts_as_charging() {
        let root = tempfile::tempdir().unwrap();
        laptop(root.path(), "Not charging", "1");

        let snap = SysfsSource::discover_in(root.path()).unwrap().poll().unwrap();
        assert!(snap.plugged);
        assert!(snap.charging);
    }

    #[test]
    fn not_charging_off_charger_is_discharging() {
        let root = tempfile::tempdir().unwrap();
        laptop(root.path(), "Not charging", "0");

        let snap = SysfsSource::discover_in(root.path()).unwrap().poll().unwrap();
        assert!(!snap.plugged);
        assert!(!snap.charging);
    }

    #[test]
    fn missing_battery_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        write_attrs(&root.path().join("AC"), &[("type", "Mains"), ("online", "1")]);

        let err = SysfsSource::discover_in(root.path()).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn missing_root_is_unavailable() {
        let err = SysfsSource::discover_in("/nonexistent/power_supply").unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn garbage_capacity_is_parse_error() {
        let root = tempfile::tempdir().unwrap();
        write_attrs(&root.path().join("BAT1"), &[("capacity", "lots"), ("status", "Charging")]);

        let mut source = SysfsSource::discover_in(root.path()).unwrap();
        assert!(matches!(source.poll(), Err(SourceError::Parse { .. })));
    }

    #[test]
    fn out_of_range_capacity_is_invalid() {
        let root = tempfile::tempdir().unwrap();
        write_attrs(&root.path().join("BAT0"), &[("capacity", "140")]);

        let mut source = SysfsSource::discover_in(root.path()).unwrap();
        assert!(matches!(source.poll(), Err(SourceError::Invalid(_))));
    }

    #[test]
    fn without_adapter_plugged_follows_status() {
        let root = tempfile::tempdir().unwrap();
        write_attrs(&root.path().join("BAT0"), &[("capacity", "90"), ("status", "Charging")]);

        let snap = SysfsSource::discover_in(root.path()).unwrap().poll().unwrap();
        assert!(snap.charging);
        assert!(snap.plugged);
    }
}
