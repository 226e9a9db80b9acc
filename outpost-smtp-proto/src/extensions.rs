//! Advertised SMTP extensions (spec §6: `8BITMIME`, `PIPELINING`,
//! `STARTTLS` if a certificate is configured).

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    EightBitMime,
    Pipelining,
    StartTls,
}

impl Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EightBitMime => "8BITMIME",
            Self::Pipelining => "PIPELINING",
            Self::StartTls => "STARTTLS",
        })
    }
}

/// The extensions this server always advertises, plus `STARTTLS` when a
/// certificate pair is configured.
#[must_use]
pub fn advertised(tls_configured: bool) -> Vec<Extension> {
    let mut extensions = vec![Extension::EightBitMime, Extension::Pipelining];
    if tls_configured {
        extensions.push(Extension::StartTls);
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starttls_only_advertised_when_configured() {
        assert!(!advertised(false).contains(&Extension::StartTls));
        assert!(advertised(true).contains(&Extension::StartTls));
    }
}
