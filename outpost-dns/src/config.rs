//! DNS engine configuration (spec §6).

use serde::Deserialize;

/// Recognized DNS configuration options (spec §6).
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    pub udp_listen_address: String,
    pub udp_listen_port: u16,
    pub udp_forward_to: String,
    pub tcp_listen_address: String,
    pub tcp_listen_port: u16,
    pub tcp_forward_to: String,
    #[serde(default)]
    pub allow_query_ip_prefixes: Vec<String>,
    pub per_ip_limit: u32,
    /// Where the plain-text hostname blocklist is fetched from (spec §6:
    /// "fetched over HTTP at startup and every 2 h").
    pub blocklist_url: String,
    #[serde(default = "default_io_timeout_sec")]
    pub io_timeout_sec: u64,
}

const fn default_io_timeout_sec() -> u64 {
    120
}

impl DnsConfig {
    /// Validate the invariants spec §6 names: `PerIPLimit >= 10`.
    ///
    /// # Errors
    /// Returns a message naming the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.per_ip_limit < 10 {
            return Err(format!(
                "per_ip_limit must be >= 10, got {}",
                self.per_ip_limit
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DnsConfig {
        DnsConfig {
            udp_listen_address: "0.0.0.0".to_string(),
            udp_listen_port: 53,
            udp_forward_to: "1.1.1.1:53".to_string(),
            tcp_listen_address: "0.0.0.0".to_string(),
            tcp_listen_port: 53,
            tcp_forward_to: "1.1.1.1:53".to_string(),
            allow_query_ip_prefixes: vec![],
            per_ip_limit: 10,
            blocklist_url: "https://example.invalid/blocklist.txt".to_string(),
            io_timeout_sec: 120,
        }
    }

    #[test]
    fn rejects_per_ip_limit_below_ten() {
        let mut cfg = sample();
        cfg.per_ip_limit = 9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_per_ip_limit_at_floor() {
        assert!(sample().validate().is_ok());
    }
}
