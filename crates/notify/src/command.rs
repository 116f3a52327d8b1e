use std::time::Duration;

use crate::sink::{Alert, NotificationSink, NotifyError, NotifyFuture};

const TIMEOUT_SECS: u64 = 10;

/// How alert text is passed to the notifier program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStyle {
    /// `notify-send -u <urgency> -a chargewatch <title> <body>`
    NotifySend,
    /// `osascript -e 'display notification "<body>" with title "<title>"'`
    Osascript,
    /// `<program> <title> <body>`
    Plain,
}

/// Shows alerts by spawning a notifier process.
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: String,
    style: CommandStyle,
}

impl CommandSink {
    pub fn new(program: impl Into<String>, style: CommandStyle) -> Self {
        Self {
            program: program.into(),
            style,
        }
    }

    /// The platform's native notifier, if there is one.
    pub fn desktop() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(Self::new("osascript", CommandStyle::Osascript))
        } else if cfg!(target_os = "linux") {
            Some(Self::new("notify-send", CommandStyle::NotifySend))
        } else {
            None
        }
    }

    /// Build from `CHARGEWATCH_NOTIFY_CMD`; falls back to the desktop notifier.
    pub fn from_env() -> Option<Self> {
        match std::env::var("CHARGEWATCH_NOTIFY_CMD") {
            Ok(program) if !program.trim().is_empty() => {
                Some(Self::new(program.trim(), CommandStyle::Plain))
            }
            _ => Self::desktop(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn args(&self, alert: &Alert) -> Vec<String> {
        let title = alert.title().to_string();
        let body = alert.body();
        match self.style {
            CommandStyle::NotifySend => {
                let urgency = match alert {
                    Alert::Low { .. } => "critical",
                    Alert::High { .. } => "normal",
                };
                vec![
                    "-u".into(),
                    urgency.into(),
                    "-a".into(),
                    "chargewatch".into(),
                    title,
                    body,
                ]
            }
            CommandStyle::Osascript => vec![
                "-e".into(),
                format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(&body),
                    escape_applescript(&title)
                ),
            ],
            CommandStyle::Plain => vec![title, body],
        }
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl NotificationSink for CommandSink {
    fn name(&self) -> &str {
        &self.program
    }

    fn deliver(&self, alert: Alert) -> NotifyFuture<'_> {
        let args = self.args(&alert);
        Box::pin(async move {
            let result = tokio::time::timeout(
                Duration::from_secs(TIMEOUT_SECS),
                tokio::process::Command::new(&self.program)
                    .args(&args)
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => Ok(()),
                Ok(Ok(output)) => {
                    let code = output.status.code().unwrap_or(-1);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let preview = stderr.lines().next().map(str::trim).unwrap_or("");
                    Err(NotifyError::CommandFailed(format!(
                        "{} exited with code {code}: {preview}",
                        self.program
                    )))
                }
                Ok(Err(e)) => Err(NotifyError::Spawn(e)),
                Err(_) => Err(NotifyError::CommandFailed(format!(
                    "{} timed out after {TIMEOUT_SECS}s",
                    self.program
                ))),
            }
        })
    }
}
