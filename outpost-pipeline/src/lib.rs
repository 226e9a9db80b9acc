//! The command pipeline (spec §3 `Command`/`Result`/`FeatureRegistry`/
//! `CommandPipeline`, §4.3 C3).
//!
//! Every protocol front-end that reaches a feature (DNS is the exception;
//! it never touches the pipeline) funnels an untrusted textual request
//! through a [`CommandPipeline`]: an ordered chain of request-transforms,
//! a [`FeatureRegistry`] lookup, a deadline-bounded feature invocation,
//! then an ordered chain of response-transforms.

mod bridges;
mod pipeline;
mod registry;
mod types;

pub use bridges::{
    AuthPrefixBridge, BridgeOutcome, CombineOutputBridge, CommandBridge, LintTruncateBridge,
    LptOverrideBridge, NoopNotifier, Notifier, NotifyBridge, ResultBridge,
    SequenceTranslatorBridge,
};
pub use pipeline::CommandPipeline;
pub use registry::FeatureRegistry;
pub use types::{Command, PipelineContext, PipelineResult};

use async_trait::async_trait;

/// The feature contract from spec §6: a unit of work named by a short
/// trigger token, reentrant, expected to honor `timeout_sec` itself where
/// practical (the pipeline additionally enforces a hard deadline).
#[async_trait]
pub trait Feature: Send + Sync {
    /// The trigger token this feature registers under (e.g. `".s"`).
    fn trigger(&self) -> &str;

    /// Run the feature against an already-authenticated, already-dispatched
    /// command.
    async fn execute(&self, command: Command) -> PipelineResult;

    /// A feature-specific self-check run at daemon startup. Default: no-op.
    fn self_test(&self) -> Result<(), String> {
        Ok(())
    }

    /// Whether this feature has everything it needs (credentials, etc.)
    /// to serve real requests. A registry with zero configured features
    /// fails [`CommandPipeline::is_sane_for_internet`].
    fn is_configured(&self) -> bool {
        true
    }
}
