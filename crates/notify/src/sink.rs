use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single alert raised by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// Discharging and at or below the minimum threshold.
    Low { level: u8, threshold: u8, remaining: u32 },
    /// Charging and at or above the maximum threshold.
    High { level: u8, threshold: u8, remaining: u32 },
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Low { .. } => "Battery low",
            Self::High { .. } => "Battery charged",
        }
    }

    pub fn body(&self) -> String {
        match *self {
            Self::Low { level, threshold, remaining } => format!(
                "Battery is at {level}% (threshold {threshold}%). Please connect the charger.\n\
                 Notifications left: {remaining}"
            ),
            Self::High { level, threshold, remaining } => format!(
                "Battery is at {level}% (threshold {threshold}%). You can unplug the charger.\n\
                 Notifications left: {remaining}"
            ),
        }
    }

    pub fn level(&self) -> u8 {
        match *self {
            Self::Low { level, .. } | Self::High { level, .. } => level,
        }
    }

    /// Alerts still allowed in this charging phase after this one.
    pub fn remaining(&self) -> u32 {
        match *self {
            Self::Low { remaining, .. } | Self::High { remaining, .. } => remaining,
        }
    }
}

/// Error type for alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),
    #[error("failed to spawn notifier: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("notifier failed: {0}")]
    CommandFailed(String),
    #[error("all sinks failed")]
    AllSinksFailed,
}

pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Something that can show an alert to the user.
///
/// Failures are reported to the caller but are never fatal to the monitor.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, alert: Alert) -> NotifyFuture<'_>;

    fn notify_low(&self, level: u8, threshold: u8, remaining: u32) -> NotifyFuture<'_> {
        self.deliver(Alert::Low { level, threshold, remaining })
    }

    fn notify_high(&self, level: u8, threshold: u8, remaining: u32) -> NotifyFuture<'_> {
        self.deliver(Alert::High { level, threshold, remaining })
    }
}

/// Mock sink for tests. Records every alert it is asked to deliver.
#[derive(Debug, Default)]
pub struct MockSink {
    alerts: Mutex<Vec<Alert>>,
    fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records alerts but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count_low(&self) -> usize {
        self.alerts()
            .iter()
            .filter(|a| matches!(a, Alert::Low { .. }))
            .count()
    }

    pub fn count_high(&self) -> usize {
        self.alerts()
            .iter()
            .filter(|a| matches!(a, Alert::High { .. }))
            .count()
    }
}

impl NotificationSink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    fn deliver(&self, alert: Alert) -> NotifyFuture<'_> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(NotifyError::Unavailable("mock configured to fail".into()))
            } else {
                Ok(())
            }
        })
    }
}

/// Delivers every alert to all sinks in order.
/// Succeeds when at least one sink accepted the alert.
pub struct SinkChain {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl SinkChain {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for SinkChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn deliver(&self, alert: Alert) -> NotifyFuture<'_> {
        Box::pin(async move {
            let mut delivered = false;
            for sink in &self.sinks {
                match sink.deliver(alert).await {
                    Ok(()) => delivered = true,
                    Err(e) => {
                        tracing::warn!(sink = sink.name(), error = %e, "alert delivery failed");
                    }
                }
            }
            if delivered {
                Ok(())
            } else {
                Err(NotifyError::AllSinksFailed)
            }
        })
    }
}
