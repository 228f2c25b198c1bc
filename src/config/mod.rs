use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the tutor backend.
    pub base_url: String,
    /// Caller-supplied API key forwarded to the backend. None uses the
    /// backend's own key.
    pub api_key: Option<String>,
    /// Quiet period after the last edit before auto-send evaluation, in ms.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:10001".to_string(),
            api_key: None,
            debounce_ms: 1000,
        }
    }
}

impl Config {
    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("feynman").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".feynman/config.toml"))
    }

    pub fn load() -> crate::error::Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| crate::error::Error::Config(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}
