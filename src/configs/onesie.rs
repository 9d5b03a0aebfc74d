use serde::{Deserialize, Serialize};

/// Tunables for the onesie client. Every field has a working default, so
/// an empty document (or `OnesieConfig::default()`) yields a usable client.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OnesieConfig {
    /// Endpoint serving the TV player config document that carries the
    /// onesie hot config.
    #[serde(default = "default_tv_config_url")]
    pub tv_config_url: String,
    /// Host prefix the hot config's base URL is appended to when asking
    /// the redirector for a delivery URL.
    #[serde(default = "default_redirector_base")]
    pub redirector_base: String,
    /// How many times a missing `Location` header is retried before the
    /// lookup is declared exhausted.
    #[serde(default = "default_redirector_attempts")]
    pub redirector_attempts: u32,
    /// Safety margin subtracted from the server-provided key TTL so a
    /// config is never handed out right before it expires mid-flight.
    #[serde(default = "default_key_expiry_margin_secs")]
    pub key_expiry_margin_secs: u64,
}

fn default_tv_config_url() -> String {
    "https://www.youtube.com/tv_config?action_get_config=true&client=lb4&theme=cl".to_string()
}

fn default_redirector_base() -> String {
    "https://redirector.googlevideo.com".to_string()
}

fn default_redirector_attempts() -> u32 {
    10
}

fn default_key_expiry_margin_secs() -> u64 {
    30
}

impl Default for OnesieConfig {
    fn default() -> Self {
        Self {
            tv_config_url: default_tv_config_url(),
            redirector_base: default_redirector_base(),
            redirector_attempts: default_redirector_attempts(),
            key_expiry_margin_secs: default_key_expiry_margin_secs(),
        }
    }
}
