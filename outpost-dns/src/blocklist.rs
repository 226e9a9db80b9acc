//! Blocklist: an atomically-swappable set of hostnames, refreshed from a
//! plain-text HTTP source at startup and periodically thereafter (spec
//! §4.5, §6).

use std::{collections::HashSet, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use tracing::{info, warn};

/// The minimum number of lines a freshly fetched blocklist must have to
/// be accepted (spec §6: "minimum 100 lines else rejected") — guards
/// against an upstream outage silently emptying the list.
const MIN_LINES: usize = 100;

/// How often the background refresh task re-fetches the source.
const REFRESH_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// A readers-many/single-writer set of blocked hostnames. Readers take a
/// cheap atomic load of the current `Arc<HashSet<_>>`; the refresher
/// builds a whole new set and swaps it in (spec §5: "the updater
/// constructs a new set and atomically swaps").
pub struct BlockList {
    current: ArcSwap<HashSet<String>>,
}

impl BlockList {
    /// An empty blocklist (everything forwards, nothing is black-holed).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            current: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// Build a blocklist directly from an in-memory set — used by tests
    /// and by any caller that already has the list (e.g. loaded from a
    /// local config) rather than a remote source.
    #[must_use]
    pub fn from_set(names: HashSet<String>) -> Self {
        Self {
            current: ArcSwap::from_pointee(names),
        }
    }

    /// `true` iff any element of `names` (the full name plus its proper
    /// suffixes, per [`crate::wire::extract_names`]) is in the blocklist.
    #[must_use]
    pub fn matches(&self, names: &[String]) -> bool {
        let current = self.current.load();
        names.iter().any(|n| current.contains(n))
    }

    /// Replace the current set, rejecting the replacement if it has
    /// fewer than [`MIN_LINES`] entries.
    fn install(&self, names: HashSet<String>) -> Result<(), String> {
        if names.len() < MIN_LINES {
            return Err(format!(
                "fetched blocklist has only {} lines (need >= {MIN_LINES})",
                names.len()
            ));
        }
        self.current.store(Arc::new(names));
        Ok(())
    }
}

/// Parse a plain-text hostname list: one hostname per line, blank lines
/// and `#`-prefixed comments ignored.
fn parse_lines(body: &str) -> HashSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Fetch the blocklist once from `url` over HTTP.
async fn fetch(url: &str) -> Result<HashSet<String>, String> {
    let body = reqwest::get(url)
        .await
        .map_err(|e| e.to_string())?
        .text()
        .await
        .map_err(|e| e.to_string())?;
    Ok(parse_lines(&body))
}

/// Fetch `url` once and build a [`BlockList`] from it, failing startup if
/// the fetch or the minimum-line check fails.
///
/// # Errors
/// Propagates the fetch error, or a message naming the line-count
/// shortfall.
pub async fn load(url: &str) -> Result<Arc<BlockList>, String> {
    let names = fetch(url).await?;
    let list = BlockList::empty();
    list.install(names)?;
    Ok(Arc::new(list))
}

/// Spawn the background task that refreshes `list` from `url` every
/// [`REFRESH_INTERVAL`]. Fetch failures and undersized lists are logged
/// and leave the current list in place (spec: startup "every 2h"
/// refresh; no mention of the refresh itself being fatal).
pub fn spawn_refresher(list: Arc<BlockList>, url: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REFRESH_INTERVAL).await;
            match fetch(&url).await {
                Ok(names) => match list.install(names) {
                    Ok(()) => info!(url = %url, "blocklist refreshed"),
                    Err(error) => warn!(url = %url, %error, "rejecting refreshed blocklist"),
                },
                Err(error) => warn!(url = %url, %error, "blocklist refresh fetch failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_matches_nothing() {
        let list = BlockList::empty();
        assert!(!list.matches(&["github.com".to_string(), "com".to_string()]));
    }

    #[test]
    fn matches_any_suffix() {
        let mut names = HashSet::new();
        names.insert("github.com".to_string());
        let list = BlockList::from_set(names);
        assert!(list.matches(&["a.b.github.com".to_string(), "b.github.com".to_string(), "github.com".to_string()]));
    }

    #[test]
    fn install_rejects_undersized_list() {
        let list = BlockList::empty();
        let mut tiny = HashSet::new();
        tiny.insert("one.example".to_string());
        assert!(list.install(tiny).is_err());
    }

    #[test]
    fn install_accepts_list_at_floor() {
        let list = BlockList::empty();
        let names: HashSet<String> = (0..MIN_LINES).map(|i| format!("host{i}.example")).collect();
        assert!(list.install(names).is_ok());
        assert!(list.matches(&["host0.example".to_string()]));
    }

    #[test]
    fn parse_lines_skips_blanks_and_comments() {
        let parsed = parse_lines("github.com\n\n# comment\nexample.com\n");
        assert_eq!(parsed.len(), 2);
    }
}
