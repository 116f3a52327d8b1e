use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the process-wide stop token and cancels it on SIGTERM or Ctrl+C.
#[derive(Debug)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Wrap an existing token, e.g. the one a [`crate::monitor::Monitor`] was built with.
    pub fn with_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that waits for a termination signal and cancels the token.
    /// The task also exits if the token is cancelled elsewhere first.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = terminate() => tracing::info!("received SIGTERM, shutting down"),
                res = signal::ctrl_c() => match res {
                    Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                },
            }
            token.cancel();
        })
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
