//! The `outpost` binary entry point (spec §4.7 C7), mirroring the
//! teacher's `empath`/`bin/main.rs` config-discovery convention but with
//! a TOML document instead of RON.

use outpost_server::config::TopLevelConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = find_config_file()?;
    let document = std::fs::read_to_string(&config_path).map_err(|e| {
        anyhow::anyhow!("failed to read config from {}: {e}", config_path.display())
    })?;
    let config = TopLevelConfig::parse(&document).map_err(|e| anyhow::anyhow!(e))?;

    outpost_server::run(config).await
}

/// Locate the configuration file using the following precedence:
/// 1. `OUTPOST_CONFIG` environment variable
/// 2. `./outpost.toml` (current working directory)
/// 3. `/etc/outpost/outpost.toml` (system-wide config)
fn find_config_file() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("OUTPOST_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("OUTPOST_CONFIG points to a non-existent file: {}", path.display());
    }

    let candidates = [
        std::path::PathBuf::from("./outpost.toml"),
        std::path::PathBuf::from("/etc/outpost/outpost.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let tried = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow::bail!("no configuration file found. Tried:\n  - OUTPOST_CONFIG environment variable\n{tried}")
}
