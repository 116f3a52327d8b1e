use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chargewatch_notify::{Alert, NotificationSink};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::cadence::{self, Direction};
use super::state::{MonitorState, MonitorStatus, Observation};
use super::throttle;
use crate::battery::{BatterySnapshot, BatterySource, SimulatedSource, Simulator, SysfsSource};
use crate::config::{Config, ConfigStore};

/// Where readings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Real hardware, falling back to the simulator when none is found.
    #[default]
    Live,
    /// Synthetic trace from the simulator.
    Simulated,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" | "run" => Ok(Self::Live),
            "test" | "simulate" => Ok(Self::Simulated),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Battery monitor. Owns its state exclusively; every mutation happens in
/// [`Monitor::check`] or [`Monitor::apply_config`], driven by one loop task.
pub struct Monitor {
    config: Config,
    state: MonitorState,
    store: Arc<dyn ConfigStore>,
    sink: Arc<dyn NotificationSink>,
    token: CancellationToken,
    status_tx: watch::Sender<MonitorStatus>,
}

impl Monitor {
    /// `config` is assumed valid; the store rejects invalid configs before they get here.
    pub fn new(
        config: Config,
        store: Arc<dyn ConfigStore>,
        sink: Arc<dyn NotificationSink>,
        token: CancellationToken,
    ) -> Self {
        let state = MonitorState::new();
        let (status_tx, _) = watch::channel(MonitorStatus::from_state(&state, &config));
        Self {
            config,
            state,
            store,
            sink,
            token,
            status_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Live status, republished after every check and config change.
    pub fn status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_tx.subscribe()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Ask the run loop to exit at its next wait.
    pub fn stop(&self) {
        tracing::info!("stopping monitor");
        self.token.cancel();
    }

    /// Poll period for the current charging direction.
    pub fn check_interval(&self) -> Duration {
        Direction::from_charging(self.state.last_charging).interval(&self.config)
    }

    /// Evaluate one reading. Returns the alert that passed the throttle gate,
    /// whether or not the sink managed to deliver it.
    pub async fn check(&mut self, now: DateTime<Utc>, snapshot: &BatterySnapshot) -> Option<Alert> {
        if self.state.is_repeat(snapshot) {
            tracing::debug!(level = snapshot.capacity, "battery unchanged, check skipped");
            return None;
        }
        tracing::debug!(level = snapshot.capacity, charging = snapshot.charging, "checking battery");

        match self.state.observe(snapshot) {
            Observation::First => {
                tracing::info!(
                    level = snapshot.capacity,
                    charging = snapshot.charging,
                    "first reading recorded"
                );
                self.publish();
                return None;
            }
            Observation::PhaseChange => {
                tracing::info!(charging = snapshot.charging, "charging state changed, notification quota reset");
            }
            Observation::SamePhase => {}
        }

        let fired = match throttle::candidate(snapshot, &self.config, &self.state) {
            Some(alert) if throttle::admits(&self.state, &self.config, now) => {
                self.fire(now, alert).await;
                Some(alert)
            }
            Some(alert) => {
                tracing::debug!(
                    ?alert,
                    shown = self.state.notifications_shown,
                    "threshold crossed but notification throttled"
                );
                None
            }
            None => None,
        };
        self.publish();
        fired
    }

    async fn fire(&mut self, now: DateTime<Utc>, alert: Alert) {
        let result = match alert {
            Alert::Low { level, threshold, remaining } => {
                self.sink.notify_low(level, threshold, remaining).await
            }
            Alert::High { level, threshold, remaining } => {
                self.sink.notify_high(level, threshold, remaining).await
            }
        };
        // Delivery is best-effort: a failed notification still consumes quota.
        if let Err(e) = result {
            tracing::warn!(sink = self.sink.name(), error = %e, "notification delivery failed");
        }
        self.state.record_notification(now);
        tracing::info!(
            ?alert,
            shown = self.state.notifications_shown,
            max = self.config.max_notifications,
            "notification raised"
        );
        self.adapt_interval(alert);
    }

    fn adapt_interval(&mut self, alert: Alert) {
        let direction = match alert {
            Alert::Low { .. } => Direction::Discharging,
            Alert::High { .. } => Direction::Charging,
        };
        let current = direction.interval_secs(&self.config);
        let adapted = cadence::adapt(current, direction.threshold(&self.config), alert.level());
        if adapted == current {
            return;
        }
        direction.set_interval_secs(&mut self.config, adapted);
        tracing::info!(?direction, from = current, to = adapted, "check interval adapted");
        if let Err(e) = self.store.save(&self.config) {
            tracing::warn!(error = %e, "failed to persist adapted interval");
        }
    }

    /// Replace the whole config. Returns false when it equals the current one.
    pub fn apply_config(&mut self, config: Config) -> bool {
        if config == self.config {
            tracing::debug!("config update identical to running config, ignored");
            return false;
        }
        self.config = config;
        self.publish();
        tracing::info!(
            interval_secs = self.check_interval().as_secs(),
            min = self.config.min_threshold,
            max = self.config.max_threshold,
            "new config applied"
        );
        true
    }

    fn publish(&self) {
        self.status_tx
            .send_replace(MonitorStatus::from_state(&self.state, &self.config));
    }

    /// Build the battery source for `mode`.
    pub fn source_for(&self, mode: Mode) -> Box<dyn BatterySource> {
        if mode == Mode::Live && !self.config.use_simulator {
            match SysfsSource::discover() {
                Ok(source) => return Box::new(source),
                Err(e) => {
                    tracing::warn!(error = %e, "no battery hardware, falling back to simulator");
                }
            }
        }
        tracing::info!("using simulated battery");
        Box::new(SimulatedSource::new(
            Simulator::from_config(&self.config),
            self.status(),
        ))
    }

    /// Run with the source for `mode` until stopped.
    pub async fn start(&mut self, mode: Mode, config_rx: Option<watch::Receiver<Config>>) {
        let source = self.source_for(mode);
        self.run(source, config_rx).await;
    }

    /// The poll loop: timer tick, config update and stop, serviced by one wait.
    /// The first poll happens immediately.
    pub async fn run(
        &mut self,
        mut source: Box<dyn BatterySource>,
        mut config_rx: Option<watch::Receiver<Config>>,
    ) {
        let token = self.token.clone();
        tracing::info!(
            source = source.name(),
            interval_secs = self.check_interval().as_secs(),
            "monitor started"
        );

        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("stop signal received, monitor exiting");
                    break;
                }
                update = next_config(&mut config_rx) => match update {
                    Some(cfg) => {
                        if self.apply_config(cfg) {
                            timer.as_mut().reset(Instant::now() + self.check_interval());
                        }
                    }
                    None => {
                        tracing::warn!("config update channel closed, hot reload disabled");
                        config_rx = None;
                    }
                },
                () = &mut timer => {
                    match source.poll() {
                        Ok(snapshot) => {
                            self.check(Utc::now(), &snapshot).await;
                        }
                        Err(e) => {
                            tracing::warn!(source = source.name(), error = %e, "battery poll failed, skipping cycle");
                        }
                    }
                    timer.as_mut().reset(Instant::now() + self.check_interval());
                }
            }
        }
        tracing::info!("monitor stopped");
    }
}

/// Latest config pushed since the last call; `None` once the sender is gone.
async fn next_config(rx: &mut Option<watch::Receiver<Config>>) -> Option<Config> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::SourceError;
    use crate::config::MemoryConfigStore;
    use chargewatch_notify::MockSink;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cfg() -> Config {
        Config {
            min_threshold: 20,
            max_threshold: 80,
            notification_interval: 60,
            max_notifications: 3,
            ..Config::default()
        }
    }

    fn monitor_with(
        config: Config,
        sink: Arc<MockSink>,
    ) -> (Monitor, Arc<MemoryConfigStore>) {
        let store = Arc::new(MemoryConfigStore::new(config.clone()));
        let m = Monitor::new(config, store.clone(), sink, CancellationToken::new());
        (m, store)
    }

    /// Initialized on a discharging reading above the threshold.
    async fn primed(config: Config) -> (Monitor, Arc<MockSink>, Arc<MemoryConfigStore>, DateTime<Utc>) {
        let sink = Arc::new(MockSink::new());
        let (mut m, store) = monitor_with(config, sink.clone());
        let t0 = Utc::now();
        assert!(m.check(t0, &BatterySnapshot::level(50, false)).await.is_none());
        (m, sink, store, t0)
    }

    #[tokio::test]
    async fn first_reading_never_notifies() {
        let sink = Arc::new(MockSink::new());
        let (mut m, _) = monitor_with(cfg(), sink.clone());
        assert!(m.check(Utc::now(), &BatterySnapshot::level(5, false)).await.is_none());
        assert!(m.state().initialized);
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn low_reading_notifies_once() {
        let (mut m, sink, _, t0) = primed(cfg()).await;
        let low = BatterySnapshot::level(15, false);

        let fired = m.check(t0, &low).await;
        assert_eq!(fired, Some(Alert::Low { level: 15, threshold: 20, remaining: 2 }));
        assert_eq!(m.state().notifications_shown, 1);

        // identical reading is a no-op, even once spacing has elapsed
        assert!(m.check(t0 + TimeDelta::hours(1), &low).await.is_none());
        assert_eq!(m.state().notifications_shown, 1);
        assert_eq!(sink.count_low(), 1);
    }

    #[tokio::test]
    async fn phase_flip_resets_quota() {
        let (mut m, sink, _, t0) = primed(cfg()).await;
        m.check(t0, &BatterySnapshot::level(15, false)).await;
        assert_eq!(m.state().notifications_shown, 1);

        assert!(m.check(t0, &BatterySnapshot::level(15, true)).await.is_none());
        assert_eq!(m.state().notifications_shown, 0);
        assert_eq!(m.state().last_notification, None);
        assert!(m.state().last_charging);
        assert_eq!(sink.count_high(), 0);
    }

    #[tokio::test]
    async fn high_reading_respects_spacing() {
        let (mut m, sink, _, t0) = primed(cfg()).await;
        m.check(t0, &BatterySnapshot::level(60, true)).await;

        assert!(m.check(t0, &BatterySnapshot::level(80, true)).await.is_some());
        assert!(m.check(t0 + TimeDelta::seconds(10), &BatterySnapshot::level(81, true)).await.is_none());
        assert!(m.check(t0 + TimeDelta::seconds(20), &BatterySnapshot::level(80, true)).await.is_none());
        assert!(m.check(t0 + TimeDelta::seconds(61), &BatterySnapshot::level(81, true)).await.is_some());
        assert_eq!(sink.count_high(), 2);
    }

    #[tokio::test]
    async fn quota_caps_each_phase() {
        let (mut m, sink, _, t0) = primed(cfg()).await;
        for i in 0..10i64 {
            let level = if i % 2 == 0 { 19 } else { 18 };
            m.check(t0 + TimeDelta::minutes(5 * i), &BatterySnapshot::level(level, false)).await;
            assert!(m.state().notifications_shown <= 3);
        }
        assert_eq!(sink.count_low(), 3);
    }

    #[tokio::test]
    async fn boundary_is_inclusive() {
        let (mut m, _, _, t0) = primed(cfg()).await;
        assert!(m.check(t0, &BatterySnapshot::level(21, false)).await.is_none());
        assert!(m.check(t0, &BatterySnapshot::level(20, false)).await.is_some());
    }

    #[tokio::test]
    async fn failed_delivery_still_consumes_quota() {
        let sink = Arc::new(MockSink::failing());
        let (mut m, _) = monitor_with(cfg(), sink.clone());
        let t0 = Utc::now();
        m.check(t0, &BatterySnapshot::level(50, false)).await;
        assert!(m.check(t0, &BatterySnapshot::level(10, false)).await.is_some());
        assert_eq!(m.state().notifications_shown, 1);
        assert_eq!(m.state().last_notification, Some(t0));
    }

    #[tokio::test]
    async fn notification_adapts_and_persists_interval() {
        let (mut m, _, store, t0) = primed(cfg()).await;
        m.check(t0, &BatterySnapshot::level(15, false)).await;

        // 1800 / 20 = 90s per point, gap 5
        assert_eq!(m.config().check_interval_discharging, 1350);
        assert_eq!(m.check_interval(), Duration::from_secs(1350));
        assert_eq!(store.saves(), 1);
        assert_eq!(store.load().unwrap().check_interval_discharging, 1350);
        assert_eq!(m.config().check_interval_charging, 30);
    }

    #[tokio::test]
    async fn status_tracks_checks() {
        let (mut m, _, _, t0) = primed(cfg()).await;
        let status = m.status();
        m.check(t0, &BatterySnapshot::level(12, false)).await;
        let s = status.borrow().clone();
        assert_eq!(s.level, Some(12));
        assert_eq!(s.notifications_shown, 1);
        assert_eq!(s.last_notification, Some(t0));
    }

    #[tokio::test]
    async fn apply_config_replaces_whole_config() {
        let (mut m, _, _, _) = primed(cfg()).await;
        assert!(!m.apply_config(cfg()));
        let next = Config { check_interval_discharging: 90, min_threshold: 30, ..cfg() };
        assert!(m.apply_config(next.clone()));
        assert_eq!(m.config(), &next);
        assert_eq!(m.check_interval(), Duration::from_secs(90));
        assert_eq!(m.status().borrow().check_interval, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn alerts_count_down_remaining_quota() {
        let (mut m, sink, _, t0) = primed(cfg()).await;
        m.check(t0, &BatterySnapshot::level(19, false)).await;
        m.check(t0 + TimeDelta::hours(1), &BatterySnapshot::level(18, false)).await;
        m.check(t0 + TimeDelta::hours(2), &BatterySnapshot::level(17, false)).await;
        let left: Vec<u32> = sink.alerts().iter().map(Alert::remaining).collect();
        assert_eq!(left, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn simulator_follows_reloaded_quota() {
        let sink = Arc::new(MockSink::new());
        let config = Config { min_threshold: 21, max_threshold: 81, ..cfg() };
        let (mut m, _) = monitor_with(config.clone(), sink.clone());
        let mut source = m.source_for(Mode::Simulated);

        // 21 initializes, 19 notifies once
        let mut now = Utc::now();
        for _ in 0..2 {
            let snap = source.poll().unwrap();
            m.check(now, &snap).await;
            now += TimeDelta::hours(1);
        }
        assert_eq!(m.state().notifications_shown, 1);

        assert!(m.apply_config(Config { max_notifications: 1, ..config }));
        for _ in 0..20 {
            let snap = source.poll().unwrap();
            m.check(now, &snap).await;
            now += TimeDelta::hours(1);
        }
        assert!(sink.count_high() >= 1, "alerts: {:?}", sink.alerts());
    }

    #[test]
    fn mode_parses_cli_words() {
        assert_eq!("test".parse::<Mode>(), Ok(Mode::Simulated));
        assert_eq!("run".parse::<Mode>(), Ok(Mode::Live));
        assert!("fly".parse::<Mode>().is_err());
    }

    struct Scripted {
        readings: Vec<Result<BatterySnapshot, SourceError>>,
        polls: Arc<AtomicUsize>,
    }

    impl BatterySource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn poll(&mut self) -> Result<BatterySnapshot, SourceError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.readings.is_empty() {
                Ok(BatterySnapshot::level(10, false))
            } else {
                self.readings.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_survives_poll_errors_and_stops() {
        let sink = Arc::new(MockSink::new());
        let config = Config { check_interval_discharging: 60, ..cfg() };
        let (mut m, _) = monitor_with(config, sink.clone());
        let token = m.token();
        let polls = Arc::new(AtomicUsize::new(0));
        let source = Scripted {
            readings: vec![
                Ok(BatterySnapshot::level(50, false)),
                Err(SourceError::Invalid("flaky".into())),
            ],
            polls: polls.clone(),
        };

        let handle = tokio::spawn(async move {
            m.run(Box::new(source), None).await;
            m
        });

        // t=0 first poll, t=60 error, t=120 low reading
        tokio::time::sleep(Duration::from_secs(140)).await;
        token.cancel();
        let m = handle.await.unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.count_low(), 1);
        assert!(m.state().initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn config_update_resets_timer() {
        let sink = Arc::new(MockSink::new());
        let (mut m, _) = monitor_with(Config { check_interval_discharging: 1000, ..cfg() }, sink);
        let token = m.token();
        let polls = Arc::new(AtomicUsize::new(0));
        let source = Scripted { readings: Vec::new(), polls: polls.clone() };
        let (tx, rx) = watch::channel(cfg());

        let handle = tokio::spawn(async move {
            m.run(Box::new(source), Some(rx)).await;
            m
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(polls.load(Ordering::SeqCst), 1);

        tx.send(Config { check_interval_discharging: 5, ..cfg() }).unwrap();
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(polls.load(Ordering::SeqCst) >= 3);

        drop(tx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        let m = handle.await.unwrap();
        assert_eq!(m.config().check_interval_discharging, 5);
    }
}
