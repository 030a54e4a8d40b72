use anyhow::{Context, Result};
use serde::Deserialize;

// Re-export section types owned by their modules
pub use crate::channel::ChannelConfig;
pub use crate::motion::MotionConfig;
pub use crate::route::RouteConfig;
pub use crate::snapshot::config::SnapshotConfig;

/// Complete synchronizer configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Backend endpoints and the identity announced on join
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// REST root used by the snapshot loader
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Event channel endpoint
    #[serde(default = "default_socket_url")]
    pub socket_url: String,
    /// Bearer token for REST calls, `token` query parameter for the channel
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
}

fn default_base_url() -> String {
    std::env::var("FLEETSYNC_BASE_URL").unwrap_or_else(|_| "http://localhost:3000/api".to_string())
}

fn default_socket_url() -> String {
    std::env::var("FLEETSYNC_SOCKET_URL").unwrap_or_else(|_| "ws://localhost:3000/ws".to_string())
}

fn default_user_id() -> String {
    "admin".to_string()
}

fn default_user_type() -> String {
    "admin".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            socket_url: default_socket_url(),
            auth_token: None,
            user_id: default_user_id(),
            user_type: default_user_type(),
        }
    }
}

/// Periodic metrics logging
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// How often the run loop logs a metrics line (seconds, 0 disables)
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_report_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<SyncConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: SyncConfig = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}
