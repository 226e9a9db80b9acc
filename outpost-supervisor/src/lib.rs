//! Restart-on-crash supervision for any start/stop daemon (spec §4.4 C4).

use std::time::Duration;

use async_trait::async_trait;
use outpost_common::OutpostError;
use tracing::{error, warn};

/// An object that runs until told to stop or until something fatal
/// happens to it.
#[async_trait]
pub trait Daemon: Send + Sync {
    /// Block until a fatal error, a panic, or a clean (anomalous) return.
    async fn start_and_block(&self) -> Result<(), OutpostError>;

    /// Ask the daemon to wind down; called after `start_and_block` returns
    /// or panics, before a possible restart.
    async fn stop(&self);

    /// A short name for this daemon, used only in log lines.
    fn name(&self) -> &str;
}

/// Runs a [`Daemon`], restarting it after `restart_interval` on panic or
/// on a clean (anomalous) return, per spec §4.4.
pub struct Supervisor {
    restart_interval: Duration,
}

impl Supervisor {
    /// `restart_interval_sec` must be `> 0` (spec §6: `{RestartIntervalSec:
    /// int>0}`); zero is clamped up to one second.
    #[must_use]
    pub fn new(restart_interval_sec: u64) -> Self {
        Self {
            restart_interval: Duration::from_secs(restart_interval_sec.max(1)),
        }
    }

    /// Run `daemon` forever, per the state machine in spec §4.4:
    ///
    /// - emergency lockdown sentinel -> exit with that error, no restart.
    /// - any other error -> log it, exit with that error, no restart.
    /// - panic -> caught, `stop()` invoked (itself panic-guarded), then
    ///   restart after `restart_interval`.
    /// - clean return -> treated as an anomaly; restart after
    ///   `restart_interval`.
    ///
    /// # Errors
    /// Returns the first error `start_and_block` returns directly (i.e.
    /// not via panic or clean return).
    pub async fn run_forever<D: Daemon + 'static>(
        &self,
        daemon: std::sync::Arc<D>,
    ) -> Result<(), OutpostError> {
        loop {
            let run_daemon = std::sync::Arc::clone(&daemon);
            let join = tokio::spawn(async move { run_daemon.start_and_block().await });

            match join.await {
                Ok(Ok(())) => {
                    warn!(daemon = daemon.name(), "start_and_block returned cleanly; treating as anomaly and restarting");
                }
                Ok(Err(error)) if error.is_lockdown() => {
                    warn!(daemon = daemon.name(), %error, "daemon exited under emergency lockdown; supervisor is stopping");
                    return Err(error);
                }
                Ok(Err(error)) => {
                    error!(daemon = daemon.name(), %error, "daemon exited with an error; supervisor is stopping");
                    return Err(error);
                }
                Err(join_error) => {
                    error!(daemon = daemon.name(), %join_error, "daemon panicked; restarting after interval");
                }
            }

            let stop_daemon = std::sync::Arc::clone(&daemon);
            if let Err(join_error) = tokio::spawn(async move { stop_daemon.stop().await }).await {
                error!(daemon = daemon.name(), %join_error, "stop() itself panicked");
            }

            tokio::time::sleep(self.restart_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct FlakyDaemon {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Daemon for FlakyDaemon {
        async fn start_and_block(&self) -> Result<(), OutpostError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt == 0 {
                panic!("first attempt always panics");
            }
            Err(OutpostError::Transient("second attempt gives up".to_string()))
        }

        async fn stop(&self) {}

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn restarts_once_after_panic_then_propagates_error() {
        let daemon = Arc::new(FlakyDaemon {
            attempts: AtomicU32::new(0),
        });
        let supervisor = Supervisor::new(0);
        let result = supervisor.run_forever(daemon.clone()).await;
        assert!(matches!(result, Err(OutpostError::Transient(_))));
        assert_eq!(daemon.attempts.load(Ordering::SeqCst), 2);
    }

    struct LockdownDaemon;

    #[async_trait]
    impl Daemon for LockdownDaemon {
        async fn start_and_block(&self) -> Result<(), OutpostError> {
            Err(OutpostError::LockedDown)
        }

        async fn stop(&self) {}

        fn name(&self) -> &str {
            "lockdown"
        }
    }

    #[tokio::test]
    async fn lockdown_exits_without_restart_loop() {
        let supervisor = Supervisor::new(0);
        let result = supervisor.run_forever(Arc::new(LockdownDaemon)).await;
        assert!(matches!(result, Err(OutpostError::LockedDown)));
    }

    struct CleanReturnOnceDaemon {
        returned_clean: AtomicU32,
    }

    #[async_trait]
    impl Daemon for CleanReturnOnceDaemon {
        async fn start_and_block(&self) -> Result<(), OutpostError> {
            if self.returned_clean.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(OutpostError::Transient("stop after one restart".to_string()))
            }
        }

        async fn stop(&self) {}

        fn name(&self) -> &str {
            "clean-return"
        }
    }

    #[tokio::test]
    async fn clean_return_is_treated_as_anomaly_and_restarts() {
        let daemon = Arc::new(CleanReturnOnceDaemon {
            returned_clean: AtomicU32::new(0),
        });
        let supervisor = Supervisor::new(0);
        let result = supervisor.run_forever(daemon.clone()).await;
        assert!(matches!(result, Err(OutpostError::Transient(_))));
        assert_eq!(daemon.returned_clean.load(Ordering::SeqCst), 2);
    }
}
