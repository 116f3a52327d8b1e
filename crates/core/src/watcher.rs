//! Config hot-reload: polls the config file and pushes fresh [`Config`] values.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError, ConfigStore};

/// How often the config file's metadata is checked.
pub const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Detects edits to the store's backing file by modification time and size.
pub struct ConfigWatcher {
    store: Arc<dyn ConfigStore>,
    path: PathBuf,
    last_seen: Option<(SystemTime, u64)>,
}

impl ConfigWatcher {
    /// Returns `None` when the store has no backing file.
    /// The file's current state is the baseline; only later edits are reported.
    pub fn new(store: Arc<dyn ConfigStore>) -> Option<Self> {
        let path = store.path()?.to_path_buf();
        let mut watcher = Self {
            store,
            path,
            last_seen: None,
        };
        watcher.last_seen = watcher.fingerprint();
        Some(watcher)
    }

    fn fingerprint(&self) -> Option<(SystemTime, u64)> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some((meta.modified().ok()?, meta.len()))
    }

    /// Reload if the file changed since the last call.
    pub fn poll_change(&mut self) -> Option<Result<Config, ConfigError>> {
        let current = self.fingerprint();
        let changed = match (&self.last_seen, &current) {
            (_, None) => false, // file disappeared, keep the running config
            (None, Some(_)) => true,
            (Some(last), Some(now)) => last != now,
        };
        if !changed {
            return None;
        }
        self.last_seen = current;
        Some(self.store.load())
    }

    /// Spawn the polling task. The receiver starts at `current` (already seen)
    /// and only ever holds the latest reload, so a slow monitor skips straight
    /// to the newest file contents.
    pub fn spawn(
        mut self,
        current: Config,
        period: Duration,
        cancel: CancellationToken,
    ) -> watch::Receiver<Config> {
        let (tx, rx) = watch::channel(current);
        tokio::spawn(async move {
            tracing::info!(path = %self.path.display(), "config watcher started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("config watcher shutting down");
                        return;
                    }
                    _ = tx.closed() => {
                        tracing::debug!("config receiver dropped, watcher exiting");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                match self.poll_change() {
                    Some(Ok(cfg)) => {
                        tx.send_replace(cfg);
                        tracing::info!("config change detected, update published");
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "config reload failed, keeping current config");
                    }
                    None => {}
                }
            }
        });
        rx
    }
}
