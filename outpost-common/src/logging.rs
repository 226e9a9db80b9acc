//! Tracing/logging setup, shared by every daemon binary.

use chrono::Utc;
use tracing_subscriber::{
    fmt::time::FormatTime, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    EnvFilter, Layer,
};

struct MicrosSinceEpoch;

impl FormatTime for MicrosSinceEpoch {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        w.write_fmt(format_args!("{}", Utc::now().timestamp_micros()))
    }
}

/// Install the process-wide `tracing` subscriber.
///
/// Honors `RUST_LOG` (via [`EnvFilter`]) and defaults to `info` when unset,
/// matching the teacher's `tracing_subscriber::fmt` setup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(MicrosSinceEpoch)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Emit a structured event tagged with a named span, mirroring the
/// `internal!`/`incoming!`/`outgoing!` macro family the teacher uses to
/// keep log call sites terse.
#[macro_export]
macro_rules! daemon_log {
    ($level:expr, $span:expr, $($msg:tt)*) => {{
        let span = $crate::tracing::span!(target: "outpost", $level, $span);
        let _enter = span.enter();
        $crate::tracing::event!(target: "outpost", $level, $($msg)*)
    }};
}

/// Log an event on the `"dns"` span.
#[macro_export]
macro_rules! dns_log {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::daemon_log!($crate::tracing::Level::$level, "dns", $($msg)*)
    };
    ($($msg:tt)*) => {
        $crate::dns_log!(level = DEBUG, $($msg)*)
    };
}

/// Log an event on the `"smtp"` span.
#[macro_export]
macro_rules! smtp_log {
    (level = $level:ident, $($msg:tt)*) => {
        $crate::daemon_log!($crate::tracing::Level::$level, "smtp", $($msg)*)
    };
    ($($msg:tt)*) => {
        $crate::smtp_log!(level = DEBUG, $($msg)*)
    };
}
