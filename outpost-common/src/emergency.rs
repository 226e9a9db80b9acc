//! The process-wide emergency lockdown flag (§4.2 / C2).
//!
//! Once triggered, the flag is never cleared for the lifetime of the
//! process. Every long-running loop in the DNS engine, the SMTP engine,
//! and daemon glue checks it between units of work and, if set, surfaces
//! [`OutpostError::LockedDown`](crate::error::OutpostError::LockedDown)
//! instead of doing further work.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A single-writer, many-reader cooperative kill switch.
///
/// Cloning an `EmergencyFlag` shares the same underlying state (it wraps
/// an `Arc`), so every daemon glued together by the supervisor observes
/// the same lockdown.
#[derive(Debug, Clone, Default)]
pub struct EmergencyFlag(Arc<AtomicBool>);

impl EmergencyFlag {
    /// Create a fresh, untriggered flag.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Flip the flag. Idempotent: triggering an already-triggered flag is
    /// a no-op besides the log line.
    pub fn trigger(&self) {
        if !self.0.swap(true, Ordering::SeqCst) {
            tracing::warn!("emergency lockdown triggered; request-serving paths are disabled");
        }
    }

    /// Check whether lockdown is in effect. Readers may observe the
    /// trigger with a small delay across threads; this is acceptable per
    /// the cooperative-lockdown contract (§5).
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::EmergencyFlag;

    #[test]
    fn starts_untriggered() {
        let flag = EmergencyFlag::new();
        assert!(!flag.is_set());
    }

    #[test]
    fn trigger_is_observed_by_clones() {
        let flag = EmergencyFlag::new();
        let clone = flag.clone();
        flag.trigger();
        assert!(clone.is_set());
    }

    #[test]
    fn trigger_is_idempotent() {
        let flag = EmergencyFlag::new();
        flag.trigger();
        flag.trigger();
        assert!(flag.is_set());
    }
}
