use std::sync::Arc;

use anyhow::Context;
use chargewatch_core::config::{self, Config, ConfigStore, JsonConfigStore};
use chargewatch_core::monitor::{Mode, Monitor};
use chargewatch_core::shutdown::ShutdownGuard;
use chargewatch_core::watcher::{ConfigWatcher, RELOAD_POLL_INTERVAL};
use chargewatch_notify::{CommandSink, LogSink, NotificationSink, SinkChain};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

enum Command {
    Monitor(Mode),
    Status,
}

fn parse_command(arg: Option<&str>) -> anyhow::Result<Command> {
    match arg {
        None => Ok(Command::Monitor(Mode::Live)),
        Some("status") => Ok(Command::Status),
        Some(word) => word
            .parse::<Mode>()
            .map(Command::Monitor)
            .map_err(|e| anyhow::anyhow!("{e} (expected run, test or status)")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arg = std::env::args().nth(1);
    let command = parse_command(arg.as_deref())?;

    // Config is the one collaborator whose failure is fatal.
    let path = config::default_path().context("cannot determine config path; set CHARGEWATCH_CONFIG")?;
    let store = JsonConfigStore::open(&path)
        .with_context(|| format!("failed to open config at {}", path.display()))?;
    let cfg = store
        .load()
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    init_tracing(&cfg);
    tracing::debug!(path = %path.display(), "config loaded");

    let store: Arc<dyn ConfigStore> = Arc::new(store);
    let guard = ShutdownGuard::new();
    let mut monitor = Monitor::new(cfg, store.clone(), build_sink(), guard.token());

    match command {
        Command::Status => {
            let mut source = monitor.source_for(Mode::Live);
            let snapshot = source.poll().context("failed to read battery")?;
            let report = serde_json::json!({
                "source": source.name(),
                "snapshot": snapshot,
                "health_percent": snapshot.health_percent(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Monitor(mode) => {
            let _signals = guard.spawn_signal_listener();
            let current = monitor.config().clone();
            let updates = ConfigWatcher::new(store)
                .map(|w| w.spawn(current, RELOAD_POLL_INTERVAL, guard.token()));
            tracing::info!(?mode, "chargewatch starting");
            monitor.start(mode, updates).await;
        }
    }
    Ok(())
}

fn init_tracing(cfg: &Config) {
    if !cfg.log_enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cfg.debug_enabled { "debug" } else { "info" })
    });
    let json = std::env::var("CHARGEWATCH_LOG_JSON").is_ok_and(|v| v == "1");
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn build_sink() -> Arc<dyn NotificationSink> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(LogSink)];
    match CommandSink::from_env() {
        Some(cmd) => {
            tracing::info!(program = cmd.program(), "desktop notifications enabled");
            sinks.push(Box::new(cmd));
        }
        None => tracing::warn!("no desktop notifier on this platform, alerts go to the log only"),
    }
    Arc::new(SinkChain::new(sinks))
}
