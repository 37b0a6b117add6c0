//! Upstream client configuration.

use serde::{Deserialize, Serialize};

/// Trading API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Versioned path segment (e.g. "v1").
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.merkle.trade".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_version: default_api_version(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// History store (REST over the backing database) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// REST root, e.g. `https://<project>.supabase.co/rest/v1`. Empty disables.
    #[serde(default)]
    pub rest_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            rest_url: String::new(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HistoryConfig {
    pub fn enabled(&self) -> bool {
        !self.rest_url.trim().is_empty()
    }
}
