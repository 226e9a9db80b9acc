//! In-process metrics for the outpost front-end suite (spec §6 ambient
//! interface). A plain `std::sync::atomic`-backed snapshot API, in the
//! spirit of the teacher's `empath-metrics` but without its OpenTelemetry
//! exporter wiring: nothing here is specified to ship an HTTP metrics
//! endpoint, so a process embedding these daemons reads snapshots
//! directly (e.g. to log them periodically, or fold them into its own
//! health payload).

mod dns;
mod smtp;

pub use dns::{DnsMetrics, DnsSnapshot};
pub use smtp::{SmtpMetrics, SmtpSnapshot};

/// The full set of counters for one process. `dns` and `smtp` are each
/// behind their own `Arc` so the DNS and SMTP daemons (and any future
/// UDP/TCP pair sharing one counter set) can hold a clone without
/// cloning `Metrics` itself.
#[derive(Debug, Default)]
pub struct Metrics {
    pub dns: std::sync::Arc<DnsMetrics>,
    pub smtp: std::sync::Arc<SmtpMetrics>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
