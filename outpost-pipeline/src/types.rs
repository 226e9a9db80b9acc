//! `Command`/`Result`/`PipelineContext` (spec §3).

use outpost_common::OutpostError;

/// An untrusted textual request plus its execution deadline.
#[derive(Debug, Clone)]
pub struct Command {
    /// UTF-8 request text. Rewritten in place as request-transforms run.
    pub content: String,
    /// Seconds the feature invocation gets before `Timeout` is surfaced.
    /// Must be `> 0`.
    pub timeout_sec: u64,
}

impl Command {
    /// Construct a command, clamping `timeout_sec` to at least one second
    /// so a misconfigured `0` never causes an instantaneous timeout.
    #[must_use]
    pub fn new(content: impl Into<String>, timeout_sec: u64) -> Self {
        Self {
            content: content.into(),
            timeout_sec: timeout_sec.max(1),
        }
    }
}

/// The outcome of running a [`Command`] through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The command as it stood right after request-transforms and any
    /// `LPT` override stripping — i.e. what was actually dispatched.
    pub command: Command,
    /// Raw feature output, untouched by response-transforms.
    pub output: String,
    /// Textual rendering suitable for a 160-char-class medium, after all
    /// response-transforms (and any `LPT` skip-bytes offset) have run.
    pub combined_output: String,
    /// `None` on success.
    pub error: Option<OutpostError>,
}

impl PipelineResult {
    /// Build a bare failure result carrying no output — used for
    /// lockdown, auth mismatch, bad prefix, and timeout.
    #[must_use]
    pub fn failure(command: Command, error: OutpostError) -> Self {
        Self {
            command,
            output: String::new(),
            combined_output: String::new(),
            error: Some(error),
        }
    }
}

/// Side-channel threaded through both transform chains so that the `LPT`
/// override (effective timeout, truncation length, skip-bytes offset —
/// spec §4.3) set during request-transforms is visible to the
/// response-transform stage and to the final skip-bytes step.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineContext {
    /// Overrides `Command.timeout_sec` for this invocation only.
    pub effective_timeout_sec: Option<u64>,
    /// Overrides the configured truncation-length floor for this
    /// invocation only.
    pub truncate_len: Option<usize>,
    /// Number of leading bytes of the final `combined_output` to skip.
    pub skip_bytes: Option<usize>,
}
