use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::transcoding::IdleTimeouts;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub transcoding: TranscodingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Require a token on protected endpoints
    #[serde(default)]
    pub enabled: bool,

    /// Token accepted via MediaBrowser/X-Emby-Token/Bearer headers or the
    /// `api_key` query parameter (generate with `segmentd generate-api-key`)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodingConfig {
    /// Directory the encoder writes playlists and segments to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Seconds an unreferenced HLS job survives (default: 60)
    #[serde(default = "default_hls_idle_timeout")]
    pub hls_idle_timeout_secs: u64,

    /// Seconds an unreferenced progressive job survives (default: 10)
    #[serde(default = "default_progressive_idle_timeout")]
    pub progressive_idle_timeout_secs: u64,

    /// How often idle jobs are checked for (default: 5)
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// Delete a job's playlist and segments when it is stopped (default: true)
    #[serde(default = "default_delete_files_on_kill")]
    pub delete_files_on_kill: bool,
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("segmentd").join("transcodes")
}

fn default_hls_idle_timeout() -> u64 {
    60
}

fn default_progressive_idle_timeout() -> u64 {
    10
}

fn default_reap_interval() -> u64 {
    5
}

fn default_delete_files_on_kill() -> bool {
    true
}

impl TranscodingConfig {
    pub fn idle_timeouts(&self) -> IdleTimeouts {
        IdleTimeouts {
            hls: Duration::from_secs(self.hls_idle_timeout_secs),
            progressive: Duration::from_secs(self.progressive_idle_timeout_secs),
        }
    }
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            hls_idle_timeout_secs: default_hls_idle_timeout(),
            progressive_idle_timeout_secs: default_progressive_idle_timeout(),
            reap_interval_secs: default_reap_interval(),
            delete_files_on_kill: default_delete_files_on_kill(),
        }
    }
}
