//! Request-transforms (`CommandBridge`) and response-transforms
//! (`ResultBridge`), plus the standard implementations named in spec §4.3.

use std::{collections::HashMap, sync::Arc};

use outpost_common::OutpostError;

use crate::types::{Command, PipelineContext, PipelineResult};

/// What a [`CommandBridge`] did to the in-flight command.
pub enum BridgeOutcome {
    /// Processing continues with the (possibly rewritten) command.
    Continue(Command),
    /// Processing stops here; the pipeline renders `error` through the
    /// response-transform chain without ever reaching the feature.
    ShortCircuit(OutpostError),
}

/// A request-transform: may rewrite `content`, replace `timeout_sec`, or
/// short-circuit the whole invocation.
pub trait CommandBridge: Send + Sync {
    /// Apply this transform.
    fn apply(&self, command: Command, ctx: &mut PipelineContext) -> BridgeOutcome;

    /// If this bridge is the one that enforces an authentication secret
    /// (spec §3 invariant (b)), the secret's length; otherwise `None`.
    /// Used only by [`crate::CommandPipeline::is_sane_for_internet`].
    fn enforces_auth_secret_len(&self) -> Option<usize> {
        None
    }
}

/// A response-transform: reshapes a [`PipelineResult`] after the feature
/// has run (or after a short-circuit/timeout produced a bare failure).
pub trait ResultBridge: Send + Sync {
    /// Apply this transform.
    fn apply(&self, result: PipelineResult, ctx: &PipelineContext) -> PipelineResult;

    /// If this bridge is the one that enforces a maximum combined-output
    /// length (spec §3 invariant (c)), that length; otherwise `None`.
    fn enforces_max_length(&self) -> Option<usize> {
        None
    }
}

/// Collapse runs of `s.is_whitespace()` characters inside `haystack` to a
/// single literal space while matching `needle` against `haystack`'s
/// leading bytes. Returns the byte offset in `haystack` immediately past
/// the match, or `None` if `needle` is not a (whitespace-collapsed) prefix.
///
/// This realizes the spec §4.3 tie-break: "authentication tokens are
/// matched after trimming leading whitespace and collapsing runs of
/// spaces within the authentication prefix".
fn match_collapsed_prefix(haystack: &str, needle: &str) -> Option<usize> {
    let mut needle_chars = needle.chars().peekable();
    let mut chars = haystack.char_indices().peekable();
    let mut idx = 0;
    let mut prev_was_space = false;

    while let Some(&want) = needle_chars.peek() {
        let Some(&(byte_idx, c)) = chars.peek() else {
            return None;
        };

        if c.is_whitespace() {
            // Collapse the whole run of whitespace in the haystack into at
            // most one logical space consumed from the needle.
            if want == ' ' && !prev_was_space {
                needle_chars.next();
            }
            chars.next();
            idx = byte_idx + c.len_utf8();
            prev_was_space = true;
            continue;
        }

        if c == want {
            needle_chars.next();
            chars.next();
            idx = byte_idx + c.len_utf8();
            prev_was_space = false;
        } else {
            return None;
        }
    }

    Some(idx)
}

/// Strip an optional separator (whitespace and/or a single literal `.`)
/// between the authentication token and the feature trigger.
fn strip_separator(rest: &str) -> &str {
    let rest = rest.trim_start();
    rest.strip_prefix('.').map_or(rest, str::trim_start)
}

/// The authentication + shortcut request-transform (spec §4.3 (a)).
///
/// Strips a leading shared secret (matched with whitespace collapsed
/// inside it) and the optional separator that follows it. `shortcuts` is
/// an exact-match table: if what remains after the secret is exactly one
/// of its keys, the mapped replacement (expected to begin with a
/// registered feature trigger) is substituted in its place.
pub struct AuthPrefixBridge {
    secret: String,
    shortcuts: HashMap<String, String>,
}

impl AuthPrefixBridge {
    /// Construct a bridge enforcing `secret` (spec requires `len(secret)
    /// >= 7` for the pipeline to be internet-sane; shorter secrets are
    /// accepted here but will fail `is_sane_for_internet`).
    #[must_use]
    pub fn new(secret: impl Into<String>, shortcuts: HashMap<String, String>) -> Self {
        Self {
            secret: secret.into(),
            shortcuts,
        }
    }
}

impl CommandBridge for AuthPrefixBridge {
    fn apply(&self, command: Command, _ctx: &mut PipelineContext) -> BridgeOutcome {
        let trimmed = command.content.trim_start();

        let Some(after_secret) = match_collapsed_prefix(trimmed, &self.secret) else {
            return BridgeOutcome::ShortCircuit(OutpostError::PinMismatch);
        };

        let remainder = strip_separator(&trimmed[after_secret..]);
        let remainder = self
            .shortcuts
            .get(remainder.trim_end())
            .map_or(remainder.to_string(), Clone::clone);

        BridgeOutcome::Continue(Command {
            content: remainder,
            timeout_sec: command.timeout_sec,
        })
    }

    fn enforces_auth_secret_len(&self) -> Option<usize> {
        Some(self.secret.len())
    }
}

/// The DTMF-style sequence-translator request-transform (spec §4.3 (b)):
/// substitutes configured token sequences, used to normalize commands
/// typed on a telephone keypad.
pub struct SequenceTranslatorBridge {
    translations: Vec<(String, String)>,
}

impl SequenceTranslatorBridge {
    #[must_use]
    pub fn new(translations: Vec<(String, String)>) -> Self {
        Self { translations }
    }
}

impl CommandBridge for SequenceTranslatorBridge {
    fn apply(&self, command: Command, _ctx: &mut PipelineContext) -> BridgeOutcome {
        let mut content = command.content;
        for (from, to) in &self.translations {
            content = content.replace(from.as_str(), to.as_str());
        }
        BridgeOutcome::Continue(Command {
            content,
            timeout_sec: command.timeout_sec,
        })
    }
}

/// The `LPT a,b,c` override (spec §4.3): when present, sets the effective
/// timeout, truncation length, and skip-bytes offset for this invocation,
/// then strips itself from the content.
pub struct LptOverrideBridge;

impl CommandBridge for LptOverrideBridge {
    fn apply(&self, command: Command, ctx: &mut PipelineContext) -> BridgeOutcome {
        let trimmed = command.content.trim_start();
        let Some(rest) = trimmed.strip_prefix("LPT ") else {
            return BridgeOutcome::Continue(command);
        };

        let (triple, remainder) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let parts: Vec<&str> = triple.split(',').collect();
        if parts.len() != 3 {
            return BridgeOutcome::ShortCircuit(OutpostError::BadLpt(format!(
                "expected 3 comma-separated values after LPT, got {}",
                parts.len()
            )));
        }

        let mut values = [0u64; 3];
        for (slot, part) in values.iter_mut().zip(parts.iter()) {
            match part.trim().parse::<u64>() {
                Ok(v) => *slot = v,
                Err(_) => {
                    return BridgeOutcome::ShortCircuit(OutpostError::BadLpt(format!(
                        "non-numeric LPT value {part:?}"
                    )))
                }
            }
        }

        ctx.effective_timeout_sec = Some(values[0]);
        ctx.truncate_len = Some(values[1] as usize);
        ctx.skip_bytes = Some(values[2] as usize);

        BridgeOutcome::Continue(Command {
            content: remainder.trim_start().to_string(),
            timeout_sec: command.timeout_sec,
        })
    }
}

/// Response-transform (a): rebuilds `combined_output` from `output` and
/// `error`.
pub struct CombineOutputBridge;

impl ResultBridge for CombineOutputBridge {
    fn apply(&self, mut result: PipelineResult, _ctx: &PipelineContext) -> PipelineResult {
        result.combined_output = result
            .error
            .as_ref()
            .map_or_else(|| result.output.clone(), ToString::to_string);
        result
    }
}

/// Response-transform (b): trims, collapses internal whitespace runs to a
/// single space, and truncates `combined_output` to the configured
/// maximum length (or the `LPT` override, if set).
pub struct LintTruncateBridge {
    max_length: usize,
}

impl LintTruncateBridge {
    #[must_use]
    pub const fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                out.push(' ');
            }
            prev_was_space = true;
        } else {
            out.push(c);
            prev_was_space = false;
        }
    }
    out
}

impl ResultBridge for LintTruncateBridge {
    fn apply(&self, mut result: PipelineResult, ctx: &PipelineContext) -> PipelineResult {
        let limit = ctx.truncate_len.unwrap_or(self.max_length);
        result.combined_output = collapse_whitespace(&result.combined_output)
            .chars()
            .take(limit)
            .collect();
        result
    }

    fn enforces_max_length(&self) -> Option<usize> {
        Some(self.max_length)
    }
}

/// A side-effect sink for response-transform (c) (e.g. emailing the
/// operator a copy of every processed command). The concrete delivery
/// mechanism is an out-of-scope external collaborator; `NoopNotifier` is
/// the default.
pub trait Notifier: Send + Sync {
    /// Observe a finished result. Must not block the pipeline for long.
    fn notify(&self, result: &PipelineResult);
}

/// A [`Notifier`] that does nothing.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _result: &PipelineResult) {}
}

/// Response-transform (c): hands the finished result to a [`Notifier`].
pub struct NotifyBridge {
    notifier: Arc<dyn Notifier>,
}

impl NotifyBridge {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl ResultBridge for NotifyBridge {
    fn apply(&self, result: PipelineResult, _ctx: &PipelineContext) -> PipelineResult {
        self.notifier.notify(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapsed_prefix_matches_extra_internal_spaces() {
        assert_eq!(match_collapsed_prefix("ab  cd", "ab cd"), Some(6));
        assert_eq!(match_collapsed_prefix("abcd", "ab cd"), None);
        assert_eq!(match_collapsed_prefix("verysecret rest", "verysecret"), Some(10));
    }

    #[test]
    fn auth_bridge_rejects_wrong_secret() {
        let bridge = AuthPrefixBridge::new("verysecret", HashMap::new());
        let mut ctx = PipelineContext::default();
        let outcome = bridge.apply(Command::new("nope .s echo hi", 5), &mut ctx);
        assert!(matches!(outcome, BridgeOutcome::ShortCircuit(OutpostError::PinMismatch)));
    }

    #[test]
    fn auth_bridge_strips_secret_and_optional_space() {
        let bridge = AuthPrefixBridge::new("verysecret", HashMap::new());
        let mut ctx = PipelineContext::default();
        let outcome = bridge.apply(Command::new(" verysecret .s echo hi", 5), &mut ctx);
        match outcome {
            BridgeOutcome::Continue(c) => assert_eq!(c.content, ".s echo hi"),
            BridgeOutcome::ShortCircuit(_) => panic!("expected match"),
        }
    }

    #[test]
    fn auth_bridge_applies_shortcut() {
        let mut shortcuts = HashMap::new();
        shortcuts.insert("ping".to_string(), ".s echo pong".to_string());
        let bridge = AuthPrefixBridge::new("verysecret", shortcuts);
        let mut ctx = PipelineContext::default();
        let outcome = bridge.apply(Command::new("verysecret ping", 5), &mut ctx);
        match outcome {
            BridgeOutcome::Continue(c) => assert_eq!(c.content, ".s echo pong"),
            BridgeOutcome::ShortCircuit(_) => panic!("expected match"),
        }
    }

    #[test]
    fn lpt_override_sets_context_and_strips_prefix() {
        let bridge = LptOverrideBridge;
        let mut ctx = PipelineContext::default();
        let outcome = bridge.apply(Command::new("LPT 5,35,0 .s echo hi", 5), &mut ctx);
        assert_eq!(ctx.effective_timeout_sec, Some(5));
        assert_eq!(ctx.truncate_len, Some(35));
        assert_eq!(ctx.skip_bytes, Some(0));
        match outcome {
            BridgeOutcome::Continue(c) => assert_eq!(c.content, ".s echo hi"),
            BridgeOutcome::ShortCircuit(_) => panic!("expected match"),
        }
    }

    #[test]
    fn lpt_override_rejects_malformed_triple() {
        let bridge = LptOverrideBridge;
        let mut ctx = PipelineContext::default();
        let outcome = bridge.apply(Command::new("LPT 5,35 .s echo hi", 5), &mut ctx);
        assert!(matches!(outcome, BridgeOutcome::ShortCircuit(OutpostError::BadLpt(_))));
    }

    #[test]
    fn lint_truncate_collapses_and_truncates() {
        let bridge = LintTruncateBridge::new(5);
        let ctx = PipelineContext::default();
        let result = PipelineResult {
            command: Command::new("", 1),
            output: "  a   b c d e f  ".to_string(),
            combined_output: "  a   b c d e f  ".to_string(),
            error: None,
        };
        let result = bridge.apply(result, &ctx);
        assert_eq!(result.combined_output, "a b c");
    }
}
