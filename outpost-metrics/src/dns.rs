//! DNS engine counters (spec §6 ambient: "blackhole answers").

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the UDP/TCP DNS accept loops.
#[derive(Debug, Default)]
pub struct DnsMetrics {
    queries_total: AtomicU64,
    blackhole_answers_total: AtomicU64,
    forwarded_total: AtomicU64,
    rejected_by_allow_list_total: AtomicU64,
}

impl DnsMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blackhole_answer(&self) {
        self.blackhole_answers_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_by_allow_list(&self) {
        self.rejected_by_allow_list_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DnsSnapshot {
        DnsSnapshot {
            queries_total: self.queries_total.load(Ordering::Relaxed),
            blackhole_answers_total: self.blackhole_answers_total.load(Ordering::Relaxed),
            forwarded_total: self.forwarded_total.load(Ordering::Relaxed),
            rejected_by_allow_list_total: self.rejected_by_allow_list_total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DnsSnapshot {
    pub queries_total: u64,
    pub blackhole_answers_total: u64,
    pub forwarded_total: u64,
    pub rejected_by_allow_list_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = DnsMetrics::new();
        metrics.record_query();
        metrics.record_query();
        metrics.record_blackhole_answer();

        let snap = metrics.snapshot();
        assert_eq!(snap.queries_total, 2);
        assert_eq!(snap.blackhole_answers_total, 1);
        assert_eq!(snap.forwarded_total, 0);
    }
}
