use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "souk_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store_base_url: String,
    pub request_timeout_secs: u64,
    /// Quiet period after which a peer's typing indicator expires, and the
    /// idle delay before our own stop-typing signal.
    pub typing_ttl_ms: i64,
    /// Window for matching a server echo to a local placeholder.
    pub echo_match_window_ms: i64,
    pub toast_dismiss_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_base_url: "http://localhost:4000/api".to_string(),
            request_timeout_secs: 10,
            typing_ttl_ms: 2000,
            echo_match_window_ms: 2000,
            toast_dismiss_secs: 4,
        }
    }
}

/// Missing file means defaults; a malformed file also means defaults, since
/// a session must still come up on a half-written config.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    match std::fs::read(&path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "malformed config, using defaults");
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.typing_ttl_ms, 2000);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, br#"{"store_base_url": "http://shop.test/api"}"#).unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.store_base_url, "http://shop.test/api");
        assert_eq!(config.echo_match_window_ms, 2000);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CONFIG_FILE), b"{not json").unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.request_timeout_secs, 10);
    }
}
