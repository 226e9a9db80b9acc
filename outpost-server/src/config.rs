//! The top-level configuration file format (spec §6 "Configuration
//! (recognized options)"), aggregating every per-crate config block the
//! way the teacher's `empath::controller::Empath` aggregates
//! `Controller<Smtp>`, `empath_spool::Controller`, and friends into one
//! deserializable document.

use serde::Deserialize;

use outpost_dns::DnsConfig;
use outpost_health::HealthConfig;
use outpost_ratelimit::RateLimitConfig;
use outpost_smtp::SmtpConfig;

/// The command pipeline's authentication/output-length knobs (spec §6
/// `Pipeline: {Features, CommandBridges, ResultBridges}`). `Features`
/// themselves are not data-configured: they name third-party `Feature`
/// implementations this workspace does not implement (spec §1), so the
/// registry stays empty and only the bridge-chain knobs live here; the
/// chain itself (`AuthPrefixBridge` -> `SequenceTranslatorBridge` ->
/// `LptOverrideBridge` on the request side) is wired in code (see
/// `lib.rs::run`).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// The shared secret `AuthPrefixBridge` enforces (spec §3 invariant
    /// (b): "at least one request-transform enforces an authentication
    /// secret of length >= 7").
    pub auth_secret: String,
    /// The floor `LintTruncateBridge` enforces (spec §3 invariant (c)).
    pub max_output_length: usize,
    /// Exact-match shortcuts `AuthPrefixBridge` expands after the secret
    /// (spec §4.3 (a)).
    #[serde(default)]
    pub auth_shortcuts: std::collections::HashMap<String, String>,
    /// Ordered `(from, to)` substitutions `SequenceTranslatorBridge`
    /// applies (spec §4.3 (b)).
    #[serde(default)]
    pub sequence_translations: Vec<(String, String)>,
}

/// Supervisor configuration (spec §6 `Supervisor: {RestartIntervalSec:
/// int>0}`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SupervisorConfig {
    pub restart_interval_sec: u64,
}

/// The full recognized configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct TopLevelConfig {
    pub dns: DnsConfig,
    pub dns_rate_limit: RateLimitConfig,
    pub smtp: SmtpConfig,
    pub smtp_rate_limit: RateLimitConfig,
    pub pipeline: PipelineConfig,
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl TopLevelConfig {
    /// Parse a configuration document (spec §6 recognized options,
    /// ambient `LogConfig`/`HealthConfig`/`MetricsConfig` blocks the
    /// distillation omits but the teacher always carries).
    ///
    /// # Errors
    /// Returns the `toml` parse error, converted to a message.
    pub fn parse(document: &str) -> Result<Self, String> {
        toml::from_str(document).map_err(|e| e.to_string())
    }

    /// Validate every sub-config's invariants, plus the pipeline's own
    /// `auth_secret` length floor (spec §3 invariant (b)).
    ///
    /// # Errors
    /// Returns a message naming the first violated invariant.
    pub fn validate(&self, own_public_ip: Option<&str>) -> Result<(), String> {
        self.dns.validate()?;
        self.smtp.validate(own_public_ip)?;
        self.dns_rate_limit.validate()?;
        self.smtp_rate_limit.validate()?;
        if self.pipeline.auth_secret.len() < 7 {
            return Err("pipeline.auth_secret must be at least 7 characters".to_string());
        }
        if self.supervisor.restart_interval_sec == 0 {
            return Err("supervisor.restart_interval_sec must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [dns]
        udp_listen_address = "0.0.0.0"
        udp_listen_port = 53
        udp_forward_to = "1.1.1.1:53"
        tcp_listen_address = "0.0.0.0"
        tcp_listen_port = 53
        tcp_forward_to = "1.1.1.1:53"
        allow_query_ip_prefixes = ["10.0."]
        per_ip_limit = 10
        blocklist_url = "https://example.invalid/blocklist.txt"

        [dns_rate_limit]
        unit_secs = 60
        max_count = 100

        [smtp]
        address = "0.0.0.0"
        port = 2525
        per_ip_limit = 5
        my_domains = ["example.com"]
        forward_to = ["howard@localhost"]
        forward_mailer_addr = "relay.example.com:25"
        reply_mailer_addr = "relay.example.com:25"

        [smtp_rate_limit]
        unit_secs = 60
        max_count = 50

        [pipeline]
        auth_secret = "verysecret"
        max_output_length = 2000

        [supervisor]
        restart_interval_sec = 5
    "#;

    #[test]
    fn parses_and_validates_sample_document() {
        let config = TopLevelConfig::parse(SAMPLE).unwrap();
        assert!(config.validate(None).is_ok());
        assert_eq!(config.dns.udp_listen_port, 53);
        assert_eq!(config.health.listen_address, "127.0.0.1:8080");
    }

    #[test]
    fn rejects_short_auth_secret() {
        let mut config = TopLevelConfig::parse(SAMPLE).unwrap();
        config.pipeline.auth_secret = "short".to_string();
        assert!(config.validate(None).is_err());
    }
}
