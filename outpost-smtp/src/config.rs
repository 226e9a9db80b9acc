//! SMTP engine configuration (spec §6).

use std::path::PathBuf;

use serde::Deserialize;

/// Recognized SMTP configuration options (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub address: String,
    pub port: u16,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub per_ip_limit: u32,
    pub my_domains: Vec<String>,
    pub forward_to: Vec<String>,
    pub forward_mailer_addr: String,
    pub reply_mailer_addr: String,
    #[serde(default = "default_io_timeout_sec")]
    pub io_timeout_sec: u64,
    /// Messages whose subject contains this keyword are never replied to
    /// (spec §4.6 "self-loop guard").
    #[serde(default = "default_outgoing_subject_keyword")]
    pub outgoing_subject_keyword: String,
}

const fn default_io_timeout_sec() -> u64 {
    120
}

fn default_outgoing_subject_keyword() -> String {
    "[outpost-reply]".to_string()
}

/// Conversation cap: exceeding this many commands is a 451 rejection
/// (spec §4.6 "Conversation cap").
pub const MAX_COMMANDS: u32 = 64;

/// Body cap in bytes (spec §4.6 "Body cap: 2 MiB").
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

impl SmtpConfig {
    /// `true` iff both halves of a certificate pair are configured.
    #[must_use]
    pub const fn tls_configured(&self) -> bool {
        self.tls_cert_path.is_some() && self.tls_key_path.is_some()
    }

    /// Validate spec §6's `PerIPLimit >= 1` and the forward-loopback
    /// guard (spec §4.6): the relay host+port used for forwarding and
    /// replies must not equal `(127.* or own_public_ip) + this_port`.
    ///
    /// # Errors
    /// Returns a message naming the first violated invariant.
    pub fn validate(&self, own_public_ip: Option<&str>) -> Result<(), String> {
        if self.per_ip_limit < 1 {
            return Err("per_ip_limit must be >= 1".to_string());
        }

        let this_port_suffix = format!(":{}", self.port);
        let is_loopback_relay = |addr: &str| {
            addr.ends_with(&this_port_suffix)
                && (addr.starts_with("127.")
                    || own_public_ip.is_some_and(|ip| addr.starts_with(ip)))
        };

        if is_loopback_relay(&self.forward_mailer_addr) || is_loopback_relay(&self.reply_mailer_addr)
        {
            return Err(format!(
                "forward/reply relay must not point back at this server's own port {}",
                self.port
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SmtpConfig {
        SmtpConfig {
            address: "0.0.0.0".to_string(),
            port: 2525,
            tls_cert_path: None,
            tls_key_path: None,
            per_ip_limit: 5,
            my_domains: vec!["example.com".to_string()],
            forward_to: vec!["howard@localhost".to_string()],
            forward_mailer_addr: "relay.example.com:25".to_string(),
            reply_mailer_addr: "relay.example.com:25".to_string(),
            io_timeout_sec: 120,
            outgoing_subject_keyword: "[outpost-reply]".to_string(),
        }
    }

    #[test]
    fn rejects_self_loopback_relay() {
        let mut cfg = sample();
        cfg.forward_mailer_addr = "127.0.0.1:2525".to_string();
        assert!(cfg.validate(None).is_err());
    }

    #[test]
    fn rejects_own_public_ip_relay() {
        let mut cfg = sample();
        cfg.forward_mailer_addr = "203.0.113.9:2525".to_string();
        assert!(cfg.validate(Some("203.0.113.9")).is_err());
    }

    #[test]
    fn accepts_distinct_relay() {
        assert!(sample().validate(Some("203.0.113.9")).is_ok());
    }
}
