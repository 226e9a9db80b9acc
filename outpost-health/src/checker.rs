//! Liveness/readiness bookkeeping (spec §6 "a `/healthz`-style TCP
//! responder reporting emergency lockdown state and daemon liveness").

use std::sync::atomic::{AtomicBool, Ordering};

use outpost_common::EmergencyFlag;

/// Tracks whether each front-end daemon has completed its startup bind,
/// alongside the shared emergency flag every daemon already checks.
#[derive(Debug)]
pub struct HealthChecker {
    emergency: EmergencyFlag,
    dns_ready: AtomicBool,
    smtp_ready: AtomicBool,
}

impl HealthChecker {
    #[must_use]
    pub fn new(emergency: EmergencyFlag) -> Self {
        Self {
            emergency,
            dns_ready: AtomicBool::new(false),
            smtp_ready: AtomicBool::new(false),
        }
    }

    pub fn set_dns_ready(&self, ready: bool) {
        self.dns_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "DNS readiness updated");
    }

    pub fn set_smtp_ready(&self, ready: bool) {
        self.smtp_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "SMTP readiness updated");
    }

    /// Liveness never fails on its own merits: if the process can answer
    /// this probe at all, it is alive. Lockdown is a readiness concern.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// Ready iff not in lockdown and every daemon has bound its socket.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.emergency.is_set()
            && self.dns_ready.load(Ordering::Relaxed)
            && self.smtp_ready.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            alive: self.is_alive(),
            ready: self.is_ready(),
            locked_down: self.emergency.is_set(),
            dns_ready: self.dns_ready.load(Ordering::Relaxed),
            smtp_ready: self.smtp_ready.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthStatus {
    pub alive: bool,
    pub ready: bool,
    pub locked_down: bool,
    pub dns_ready: bool,
    pub smtp_ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_both_daemons_bind() {
        let checker = HealthChecker::new(EmergencyFlag::new());
        assert!(!checker.is_ready());
        checker.set_dns_ready(true);
        assert!(!checker.is_ready());
        checker.set_smtp_ready(true);
        assert!(checker.is_ready());
    }

    #[test]
    fn lockdown_overrides_ready_daemons() {
        let emergency = EmergencyFlag::new();
        let checker = HealthChecker::new(emergency.clone());
        checker.set_dns_ready(true);
        checker.set_smtp_ready(true);
        assert!(checker.is_ready());
        emergency.trigger();
        assert!(!checker.is_ready());
        assert!(checker.is_alive());
    }
}
