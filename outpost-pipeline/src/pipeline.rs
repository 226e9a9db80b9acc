//! `CommandPipeline` (spec §3/§4.3): wires the transform chains around a
//! `FeatureRegistry` lookup and a deadline-bounded feature invocation.

use outpost_common::{EmergencyFlag, OutpostError};

use crate::{
    bridges::{BridgeOutcome, CommandBridge, ResultBridge},
    registry::FeatureRegistry,
    types::{Command, PipelineContext, PipelineResult},
};

/// The end-to-end request/response pipeline shared by every protocol
/// front-end that dispatches to a [`crate::Feature`].
pub struct CommandPipeline {
    registry: FeatureRegistry,
    request_bridges: Vec<Box<dyn CommandBridge>>,
    response_bridges: Vec<Box<dyn ResultBridge>>,
}

impl CommandPipeline {
    /// Assemble a pipeline from its registry and ordered transform chains.
    #[must_use]
    pub fn new(
        registry: FeatureRegistry,
        request_bridges: Vec<Box<dyn CommandBridge>>,
        response_bridges: Vec<Box<dyn ResultBridge>>,
    ) -> Self {
        Self {
            registry,
            request_bridges,
            response_bridges,
        }
    }

    /// Checks spec §3's "internet-sane" invariants: at least one configured
    /// feature, an authentication secret of at least 7 characters, and a
    /// maximum combined-output length floor. Returns every violation found
    /// rather than stopping at the first, so startup logs the complete
    /// picture.
    #[must_use]
    pub fn is_sane_for_internet(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.registry.has_configured_feature() {
            problems.push("no configured feature is registered".to_string());
        }

        let auth_len = self
            .request_bridges
            .iter()
            .find_map(|b| b.enforces_auth_secret_len());
        match auth_len {
            None => problems.push("no request-transform enforces an authentication secret".to_string()),
            Some(len) if len < 7 => {
                problems.push(format!("authentication secret is only {len} characters (need >= 7)"));
            }
            Some(_) => {}
        }

        if self
            .response_bridges
            .iter()
            .find_map(|b| b.enforces_max_length())
            .is_none()
        {
            problems.push("no response-transform enforces a maximum output length".to_string());
        }

        problems
    }

    /// Run every registered feature's self-check (spec §3 `self_test`).
    /// Returns one message per failure; empty means every feature is
    /// healthy.
    #[must_use]
    pub fn self_test(&self) -> Vec<String> {
        self.registry
            .iter()
            .filter_map(|f| f.self_test().err())
            .collect()
    }

    /// Run `command` through the full pipeline: lockdown check,
    /// request-transforms, feature dispatch under a deadline,
    /// response-transforms, and the final `LPT` skip-bytes trim.
    pub async fn process(&self, command: Command, emergency: &EmergencyFlag) -> PipelineResult {
        if emergency.is_set() {
            return PipelineResult::failure(command, OutpostError::LockedDown);
        }

        let mut ctx = PipelineContext::default();
        let mut command = command;

        for bridge in &self.request_bridges {
            match bridge.apply(command, &mut ctx) {
                BridgeOutcome::Continue(next) => command = next,
                BridgeOutcome::ShortCircuit(error) => {
                    let failed = PipelineResult::failure(command_for_failure(&ctx), error);
                    return self.finish(failed, &ctx);
                }
            }
        }

        let Some(feature) = self.registry.match_prefix(&command.content) else {
            let failed = PipelineResult::failure(command, OutpostError::BadPrefix);
            return self.finish(failed, &ctx);
        };

        let timeout_sec = ctx.effective_timeout_sec.unwrap_or(command.timeout_sec);
        let result = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_sec),
            feature.execute(command.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => PipelineResult::failure(command, OutpostError::Timeout),
        };

        self.finish(result, &ctx)
    }

    /// Apply every response-transform, then the `LPT` skip-bytes offset
    /// (a raw byte skip, snapped forward to the next UTF-8 character
    /// boundary so the output never gets sliced mid-codepoint).
    fn finish(&self, mut result: PipelineResult, ctx: &PipelineContext) -> PipelineResult {
        for bridge in &self.response_bridges {
            result = bridge.apply(result, ctx);
        }

        if let Some(skip) = ctx.skip_bytes {
            let boundary = (skip..=result.combined_output.len())
                .find(|&i| result.combined_output.is_char_boundary(i))
                .unwrap_or(result.combined_output.len());
            result.combined_output = result.combined_output[boundary..].to_string();
        }

        result
    }
}

/// A short-circuit happens before a feature ever sees the command, so the
/// failure result just needs *a* command to carry; an empty one with the
/// context's effective timeout (if any) is as good as the original.
fn command_for_failure(ctx: &PipelineContext) -> Command {
    Command::new(String::new(), ctx.effective_timeout_sec.unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::{AuthPrefixBridge, CombineOutputBridge, Feature, LintTruncateBridge};

    struct Echo;

    #[async_trait]
    impl Feature for Echo {
        fn trigger(&self) -> &str {
            ".s echo "
        }

        async fn execute(&self, command: Command) -> PipelineResult {
            let text = command.content.trim_start_matches(".s echo ").to_string();
            PipelineResult {
                command,
                combined_output: text.clone(),
                output: text,
                error: None,
            }
        }
    }

    fn build_pipeline(max_length: usize) -> CommandPipeline {
        let mut registry = FeatureRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        CommandPipeline::new(
            registry,
            vec![Box::new(AuthPrefixBridge::new("verysecret", HashMap::new()))],
            vec![
                Box::new(CombineOutputBridge),
                Box::new(LintTruncateBridge::new(max_length)),
            ],
        )
    }

    #[test]
    fn sanity_check_flags_short_secret() {
        let mut registry = FeatureRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        let pipeline = CommandPipeline::new(
            registry,
            vec![Box::new(AuthPrefixBridge::new("short", HashMap::new()))],
            vec![Box::new(LintTruncateBridge::new(35))],
        );
        let problems = pipeline.is_sane_for_internet();
        assert!(problems.iter().any(|p| p.contains("authentication secret")));
    }

    #[test]
    fn sanity_check_passes_for_well_formed_pipeline() {
        let pipeline = build_pipeline(35);
        assert!(pipeline.is_sane_for_internet().is_empty());
    }

    #[tokio::test]
    async fn wrong_secret_is_locked_out() {
        let pipeline = build_pipeline(35);
        let emergency = EmergencyFlag::new();
        let result = pipeline
            .process(Command::new("nope .s echo hi", 5), &emergency)
            .await;
        assert!(matches!(result.error, Some(OutpostError::PinMismatch)));
    }

    #[tokio::test]
    async fn lockdown_short_circuits_before_auth() {
        let pipeline = build_pipeline(35);
        let emergency = EmergencyFlag::new();
        emergency.trigger();
        let result = pipeline
            .process(Command::new("verysecret .s echo hi", 5), &emergency)
            .await;
        assert!(matches!(result.error, Some(OutpostError::LockedDown)));
    }

    #[tokio::test]
    async fn scenario_d_auth_and_truncation() {
        let pipeline = build_pipeline(35);
        let emergency = EmergencyFlag::new();
        let digits = "0123456789".repeat(4);
        let content = format!("verysecret .s echo {digits}");
        let result = pipeline.process(Command::new(content, 5), &emergency).await;

        assert!(result.error.is_none());
        assert_eq!(result.combined_output, "01234567890123456789012345678901234");
        assert_eq!(result.combined_output.len(), 35);
    }

    #[tokio::test]
    async fn unmatched_prefix_surfaces_bad_prefix() {
        let pipeline = build_pipeline(35);
        let emergency = EmergencyFlag::new();
        let result = pipeline
            .process(Command::new("verysecret .nonexistent", 5), &emergency)
            .await;
        assert!(matches!(result.error, Some(OutpostError::BadPrefix)));
    }
}
