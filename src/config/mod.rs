mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./segmentd.toml",
        "~/.config/segmentd/config.toml",
        "/etc/segmentd/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.auth.enabled
        && config
            .server
            .auth
            .api_key
            .as_deref()
            .map_or(true, str::is_empty)
    {
        anyhow::bail!("Authentication is enabled but no api_key is configured");
    }

    let transcoding = &config.transcoding;
    if transcoding.hls_idle_timeout_secs == 0 || transcoding.progressive_idle_timeout_secs == 0 {
        anyhow::bail!("Idle timeouts must be greater than 0");
    }
    if transcoding.reap_interval_secs == 0 {
        anyhow::bail!("reap_interval_secs must be greater than 0");
    }

    if !transcoding.output_dir.exists() {
        tracing::warn!(
            "Transcode output directory does not exist yet: {:?}",
            transcoding.output_dir
        );
    }

    Ok(())
}
