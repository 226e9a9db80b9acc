//! Health endpoint configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

const fn default_enabled() -> bool {
    true
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listen_address: default_listen_address(),
        }
    }
}
