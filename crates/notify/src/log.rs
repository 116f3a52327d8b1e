use crate::sink::{Alert, NotificationSink, NotifyFuture};

/// Emits alerts as warn-level tracing events. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, alert: Alert) -> NotifyFuture<'_> {
        Box::pin(async move {
            let (Alert::Low { level, threshold, remaining }
            | Alert::High { level, threshold, remaining }) = alert;
            tracing::warn!(level, threshold, remaining, title = alert.title(), "{}", alert.body());
            Ok(())
        })
    }
}
