//! SMTP engine counters (spec §6 ambient: "requests, rate-limit
//! rejections, ... pipeline errors by kind").

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SmtpMetrics {
    connections_total: AtomicU64,
    messages_received_total: AtomicU64,
    rate_limit_rejections_total: AtomicU64,
    /// Keyed by the `OutpostError` variant name (e.g. `"PinMismatch"`).
    pipeline_errors_by_kind: DashMap<String, u64>,
}

impl SmtpMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pipeline_error(&self, kind: &str) {
        *self.pipeline_errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> SmtpSnapshot {
        SmtpSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_received_total: self.messages_received_total.load(Ordering::Relaxed),
            rate_limit_rejections_total: self.rate_limit_rejections_total.load(Ordering::Relaxed),
            pipeline_errors_by_kind: self
                .pipeline_errors_by_kind
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SmtpSnapshot {
    pub connections_total: u64,
    pub messages_received_total: u64,
    pub rate_limit_rejections_total: u64,
    pub pipeline_errors_by_kind: std::collections::HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_grouped_by_kind() {
        let metrics = SmtpMetrics::new();
        metrics.record_pipeline_error("PinMismatch");
        metrics.record_pipeline_error("PinMismatch");
        metrics.record_pipeline_error("Timeout");

        let snap = metrics.snapshot();
        assert_eq!(snap.pipeline_errors_by_kind.get("PinMismatch"), Some(&2));
        assert_eq!(snap.pipeline_errors_by_kind.get("Timeout"), Some(&1));
    }
}
