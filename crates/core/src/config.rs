use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_vision_model")]
    pub model: String,
}

fn default_vision_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_vision_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Launch the browser without a visible window.
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Explicit browser binary path. When unset, well-known install
    /// locations are probed first, then PATH.
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Upper bound on a single page load.
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    /// Pause after click/type before capturing state.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Pause after scrolling.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    /// Longer pause after submitting a sign-in form, which usually triggers
    /// a redirect chain.
    #[serde(default = "default_sign_in_settle_ms")]
    pub sign_in_settle_ms: u64,
}

fn default_headless() -> bool {
    true
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    500
}

fn default_scroll_settle_ms() -> u64 {
    200
}

fn default_sign_in_settle_ms() -> u64 {
    2000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            binary: None,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            settle_ms: default_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            sign_in_settle_ms: default_sign_in_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
}

impl Config {
    /// Load config from the standard location, falling back to defaults when
    /// the file does not exist. `GEMINI_API_KEY` overrides the file value.
    pub fn load(paths: &Paths) -> Result<Self> {
        let mut config = Self::load_file(&paths.config_file())?;
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.gemini.api_key = key;
            }
        }
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert_eq!(config.browser.viewport_width, 1920);
        assert_eq!(config.browser.viewport_height, 1080);
        assert_eq!(config.browser.page_load_timeout_secs, 30);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, r#"{"browser": {"headless": false}}"#).unwrap();

        let config = Config::load_file(&file).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.page_load_timeout_secs, 30);
        // The gemini section is absent entirely; the model default must
        // still apply or the vision client builds a bad request URL.
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_file(&dir.path().join("nope.json")).unwrap();
        assert!(config.browser.headless);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.json");
        std::fs::write(&file, "{not json").unwrap();
        assert!(matches!(Config::load_file(&file), Err(Error::Config(_))));
    }
}
