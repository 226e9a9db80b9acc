//! Public-IP discovery (spec §6): "the DNS engine queries three
//! independent public-IP endpoints in parallel with 5 s timeout,
//! returning the first non-empty answer".

use std::time::Duration;

use futures::future::select_ok;
use tracing::warn;

const ENDPOINTS: [&str; 3] = [
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

const TIMEOUT: Duration = Duration::from_secs(5);

async fn query_one(url: &'static str) -> Result<String, ()> {
    let client = reqwest::Client::new();
    let response = tokio::time::timeout(TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| ())?
        .map_err(|_| ())?;
    let body = response.text().await.map_err(|_| ())?;
    let trimmed = body.trim().to_string();
    if trimmed.is_empty() {
        Err(())
    } else {
        Ok(trimmed)
    }
}

/// Race the three endpoints and return the first non-empty answer, or
/// `None` if all three fail or time out.
pub async fn discover() -> Option<String> {
    let attempts = ENDPOINTS.iter().map(|&url| Box::pin(query_one(url)));

    match select_ok(attempts).await {
        Ok((ip, _remaining)) => Some(ip),
        Err(()) => {
            warn!("all public IP lookup endpoints failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_list_has_three_independent_sources() {
        assert_eq!(ENDPOINTS.len(), 3);
    }
}
