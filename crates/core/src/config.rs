use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Policy parameters for the monitor. Loaded from a JSON file at startup;
/// missing keys are filled from [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // thresholds (percent)
    pub min_threshold: u8,
    pub max_threshold: u8,

    // poll intervals (seconds)
    pub check_interval_charging: u64,
    pub check_interval_discharging: u64,

    // throttle
    pub notification_interval: u64,
    pub max_notifications: u32,

    pub use_simulator: bool,
    pub debug_enabled: bool,
    pub log_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_threshold: 21,
            max_threshold: 81,
            check_interval_charging: 30,
            check_interval_discharging: 1800,
            notification_interval: 1800,
            max_notifications: 3,
            use_simulator: false,
            debug_enabled: false,
            log_enabled: true,
        }
    }
}

impl Config {
    /// Enforce `0 < min < max < 100` and non-zero intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_threshold == 0 {
            return Err(ConfigError::Invalid("min_threshold must be above 0".into()));
        }
        if self.min_threshold >= self.max_threshold {
            return Err(ConfigError::Invalid(format!(
                "min_threshold ({}) must be below max_threshold ({})",
                self.min_threshold, self.max_threshold
            )));
        }
        if self.max_threshold >= 100 {
            return Err(ConfigError::Invalid("max_threshold must be below 100".into()));
        }
        for (key, value) in [
            ("check_interval_charging", self.check_interval_charging),
            ("check_interval_discharging", self.check_interval_discharging),
            ("notification_interval", self.notification_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be above 0")));
            }
        }
        Ok(())
    }

    pub fn notification_spacing(&self) -> Duration {
        Duration::from_secs(self.notification_interval)
    }

    /// Build from a parsed JSON object. Absent keys take their default and are
    /// reported in the returned list.
    fn from_map(m: &Map<String, Value>) -> Result<(Self, Vec<&'static str>), ConfigError> {
        let d = Self::default();
        let mut missing = Vec::new();
        let cfg = Self {
            min_threshold: get_or(m, "min_threshold", d.min_threshold, &mut missing)?,
            max_threshold: get_or(m, "max_threshold", d.max_threshold, &mut missing)?,
            check_interval_charging: get_or(m, "check_interval_charging", d.check_interval_charging, &mut missing)?,
            check_interval_discharging: get_or(m, "check_interval_discharging", d.check_interval_discharging, &mut missing)?,
            notification_interval: get_or(m, "notification_interval", d.notification_interval, &mut missing)?,
            max_notifications: get_or(m, "max_notifications", d.max_notifications, &mut missing)?,
            use_simulator: get_or(m, "use_simulator", d.use_simulator, &mut missing)?,
            debug_enabled: get_or(m, "debug_enabled", d.debug_enabled, &mut missing)?,
            log_enabled: get_or(m, "log_enabled", d.log_enabled, &mut missing)?,
        };
        Ok((cfg, missing))
    }
}

fn get_or<T: DeserializeOwned>(
    map: &Map<String, Value>,
    key: &'static str,
    default: T,
    missing: &mut Vec<&'static str>,
) -> Result<T, ConfigError> {
    match map.get(key) {
        Some(v) => serde_json::from_value(v.clone()).map_err(|source| ConfigError::Field { key, source }),
        None => {
            missing.push(key);
            Ok(default)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad value for `{key}`: {source}")]
    Field {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Loads and persists [`Config`]. The monitor only writes through `save`.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;

    fn save(&self, cfg: &Config) -> Result<(), ConfigError>;

    /// Backing file, if any. The watcher polls it for edits.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Default config location: `$CHARGEWATCH_CONFIG`, then
/// `$XDG_CONFIG_HOME/chargewatch/config.json`, then `~/.config/chargewatch/config.json`.
pub fn default_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHARGEWATCH_CONFIG")
        && !p.is_empty()
    {
        return Some(PathBuf::from(p));
    }
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join("chargewatch").join("config.json"))
}

/// Pretty-printed JSON file store with atomic saves.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    /// Open a store at `path`, creating its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(Self { path })
    }

    fn io_err(&self, source: std::io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for JsonConfigStore {
    /// Missing file: write and return defaults. Otherwise parse, fill absent keys
    /// from defaults (re-saving if any were absent) and validate.
    fn load(&self) -> Result<Config, ConfigError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "config not found, writing defaults");
                let cfg = Config::default();
                self.save(&cfg)?;
                return Ok(cfg);
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let map: Map<String, Value> = serde_json::from_str(&raw)?;
        let (cfg, missing) = Config::from_map(&map)?;
        cfg.validate()?;

        if !missing.is_empty() {
            for key in &missing {
                tracing::debug!(key, "config key missing, using default");
            }
            if let Err(e) = self.save(&cfg) {
                tracing::warn!(error = %e, "failed to save config completed with defaults");
            }
        }
        Ok(cfg)
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        serde_json::to_writer_pretty(&mut tmp, cfg)?;
        tmp.write_all(b"\n").map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        tracing::debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// In-memory store. Keeps the last saved config and counts saves.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<(Config, usize)>,
}

impl MemoryConfigStore {
    pub fn new(cfg: Config) -> Self {
        Self {
            inner: Mutex::new((cfg, 0)),
        }
    }

    pub fn saves(&self) -> usize {
        self.inner.lock().map(|g| g.1).unwrap_or(0)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Config, ConfigError> {
        self.inner
            .lock()
            .map(|g| g.0.clone())
            .map_err(|_| ConfigError::Invalid("memory store poisoned".into()))
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ConfigError::Invalid("memory store poisoned".into()))?;
        guard.0 = cfg.clone();
        guard.1 += 1;
        Ok(())
    }
}
