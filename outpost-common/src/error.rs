//! The error taxonomy from spec §7.
//!
//! `OutpostError` is the kind-based error every crate in the workspace
//! converges on at the daemon-glue boundary. Per-crate errors (DNS, SMTP)
//! keep their own `thiserror` enums for internal detail and implement
//! `From` into this one where they cross into pipeline/daemon-glue code.

use thiserror::Error;

/// Errors surfaced by the command pipeline, the supervisor, and daemon
/// glue, per spec §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutpostError {
    /// A configuration value was invalid; fatal at daemon init.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A retry-safe transient failure (e.g. socket timeout). The caller
    /// that owns the retry policy decides whether to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The authentication token at the start of `Command.content` did
    /// not match the configured secret.
    #[error("authentication token mismatch")]
    PinMismatch,

    /// No feature in the registry matched the leading trigger prefix.
    #[error("no feature matches the given prefix")]
    BadPrefix,

    /// The `LPT a,b,c` override prefix was present but malformed.
    #[error("malformed LPT override: {0}")]
    BadLpt(String),

    /// The feature invocation did not complete within `timeout_sec`.
    #[error("feature execution timed out")]
    Timeout,

    /// The process-wide emergency flag is set; no new work is served.
    #[error("emergency lockdown in effect")]
    LockedDown,

    /// A handler task panicked; the supervisor caught it.
    #[error("daemon panicked: {0}")]
    Panic(String),

    /// The feature ran but failed; detail is surfaced verbatim.
    #[error("feature failed: {0}")]
    FeatureFailure(String),
}

impl OutpostError {
    /// `true` for the sentinel that tells the supervisor not to restart
    /// the daemon (the process stays up to answer health checks, but
    /// stops serving requests).
    #[must_use]
    pub const fn is_lockdown(&self) -> bool {
        matches!(self, Self::LockedDown)
    }

    /// The variant's name, with no payload — used as the grouping key
    /// for per-kind error counters (e.g. `outpost-metrics::SmtpMetrics`).
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "ConfigInvalid",
            Self::Transient(_) => "Transient",
            Self::PinMismatch => "PinMismatch",
            Self::BadPrefix => "BadPrefix",
            Self::BadLpt(_) => "BadLpt",
            Self::Timeout => "Timeout",
            Self::LockedDown => "LockedDown",
            Self::Panic(_) => "Panic",
            Self::FeatureFailure(_) => "FeatureFailure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OutpostError;

    #[test]
    fn lockdown_is_identified() {
        assert!(OutpostError::LockedDown.is_lockdown());
        assert!(!OutpostError::Timeout.is_lockdown());
    }
}
