//! Allowed source-IP policy (spec §4.5 "Allowed source policy").

use tracing::warn;

/// A list of textual IP prefixes a query's source address must
/// `starts_with` to be served. The host's own public IP is appended at
/// construction time (spec §6: "appends that IP to its allow-list").
pub struct AllowList {
    prefixes: Vec<String>,
}

impl AllowList {
    /// Build the allow-list from configured prefixes plus the
    /// (optional — discovery can fail) host's own public IP.
    #[must_use]
    pub fn new(mut prefixes: Vec<String>, own_public_ip: Option<String>) -> Self {
        if let Some(ip) = own_public_ip {
            prefixes.push(ip);
        }
        Self { prefixes }
    }

    /// `true` iff `source_ip` starts with any configured prefix.
    #[must_use]
    pub fn allows(&self, source_ip: &str) -> bool {
        self.prefixes.iter().any(|prefix| source_ip.starts_with(prefix.as_str()))
    }

    /// `allows`, but also logs a warning on rejection (spec: "dropped
    /// after logging").
    pub fn allows_logged(&self, source_ip: &str) -> bool {
        let allowed = self.allows(source_ip);
        if !allowed {
            warn!(source_ip, "dropping DNS query from disallowed source");
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_configured_prefix() {
        let allow = AllowList::new(vec!["10.0.".to_string()], None);
        assert!(allow.allows("10.0.0.5"));
        assert!(!allow.allows("192.168.0.5"));
    }

    #[test]
    fn own_public_ip_is_appended() {
        let allow = AllowList::new(vec![], Some("203.0.113.9".to_string()));
        assert!(allow.allows("203.0.113.9"));
    }
}
