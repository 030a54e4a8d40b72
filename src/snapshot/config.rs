use serde::{Deserialize, Serialize};

/// Configuration for the snapshot loader
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Agent collection, relative to the server base URL
    pub agents_path: String,

    pub restaurants_path: String,

    pub orders_path: String,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Interval between refreshes (seconds); 0 loads only once on start
    pub refresh_interval_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            agents_path: "/agents".to_string(),
            restaurants_path: "/restaurants".to_string(),
            orders_path: "/orders".to_string(),
            timeout_secs: 10,
            refresh_interval_secs: 0,
        }
    }
}
