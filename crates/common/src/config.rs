//! Client configuration types.

use serde::{Deserialize, Serialize};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Backend base URL; every request path is appended to it. Point it at a
    /// same-origin proxy to route through a rewrite.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    "screener/0.1".into()
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ScreenerConfig {
    /// Config pointing at a specific base URL, other fields defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }
}
