//! Scraper configuration
//!
//! Every knob has a default, so an empty TOML file is a valid config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::LinkRules;
use crate::download::DuplicateCheck;
use crate::error::{Result, XbuddyError};
use crate::url::PROCESS_BASE_URL;

/// Desktop Chrome user agent sent by the browser and the HTTP client
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for one [`XbuddyScraper`](crate::XbuddyScraper)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Aggregator process endpoint (default: 9xbuddy)
    pub process_base_url: String,
    /// Where finished downloads land (default: `downloads`)
    pub downloads_dir: PathBuf,
    /// Append-only debug log (default: `xbuddy_debug.log`)
    pub debug_log_path: PathBuf,
    pub user_agent: String,
    /// Max wait for the result container to render (default: 30)
    pub render_timeout_secs: u64,
    /// Pause after rendering before reading the DOM (default: 5)
    pub settle_secs: u64,
    /// Max wait for a click to start a download (default: 15)
    pub click_timeout_secs: u64,
    /// Max wait for a browser download to finish (default: 600)
    pub download_timeout_secs: u64,
    /// Grace period before popups are closed (default: 10)
    pub popup_timeout_secs: u64,
    /// HTTP connect timeout (default: 30)
    pub connect_timeout_secs: u64,
    /// HTTP read timeout between chunks (default: 120)
    pub request_timeout_secs: u64,
    /// Write buffer size for streamed downloads (default: 8192)
    pub chunk_size: usize,
    pub duplicate_check: DuplicateCheck,
    /// Page events buffered before new ones are dropped (default: 256)
    pub event_queue_capacity: usize,
    pub headless: bool,
    /// Chrome binary; auto-detected when unset
    pub chrome_executable: Option<PathBuf>,
    /// ffmpeg binary used for HLS (default: `ffmpeg` on PATH)
    pub ffmpeg_path: PathBuf,
    pub rules: LinkRules,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            process_base_url: PROCESS_BASE_URL.to_string(),
            downloads_dir: PathBuf::from("downloads"),
            debug_log_path: PathBuf::from("xbuddy_debug.log"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            render_timeout_secs: 30,
            settle_secs: 5,
            click_timeout_secs: 15,
            download_timeout_secs: 600,
            popup_timeout_secs: 10,
            connect_timeout_secs: 30,
            request_timeout_secs: 120,
            chunk_size: 8192,
            duplicate_check: DuplicateCheck::default(),
            event_queue_capacity: 256,
            headless: true,
            chrome_executable: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            rules: LinkRules::default(),
        }
    }
}

impl ScraperConfig {
    /// Parses and validates a TOML document
    ///
    /// # Errors
    /// Returns `Config` on malformed TOML or an invalid value
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| XbuddyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file
    ///
    /// # Errors
    /// - `Io` - The file cannot be read
    /// - `Config` - The file is not a valid config
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Rejects values that would make a scrape impossible
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(XbuddyError::Config("chunk_size must be positive".to_string()));
        }
        if self.render_timeout_secs == 0 {
            return Err(XbuddyError::Config(
                "render_timeout_secs must be positive".to_string(),
            ));
        }
        if self.process_base_url.trim().is_empty() {
            return Err(XbuddyError::Config("process_base_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_secs(self.click_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn popup_timeout(&self) -> Duration {
        Duration::from_secs(self.popup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ScraperConfig::default();
        assert_eq!(config.process_base_url, "https://9xbuddy.site/process");
        assert_eq!(config.render_timeout_secs, 30);
        assert_eq!(config.settle_secs, 5);
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.duplicate_check, DuplicateCheck::Size);
        assert!(config.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ScraperConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScraperConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let text = r#"
            downloads_dir = "/tmp/videos"
            render_timeout_secs = 45
            duplicate_check = "content"
            headless = false

            [rules]
            resolution_hint = "720"
        "#;

        let config = ScraperConfig::from_toml_str(text).unwrap();
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/videos"));
        assert_eq!(config.render_timeout(), Duration::from_secs(45));
        assert_eq!(config.duplicate_check, DuplicateCheck::Content);
        assert!(!config.headless);
        assert_eq!(config.rules.resolution_hint, "720");
        // Untouched rule fields keep their defaults
        assert_eq!(config.rules.anchor_selector, LinkRules::default().anchor_selector);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = ScraperConfig::from_toml_str("chunk_size = 0");
        assert!(matches!(result, Err(XbuddyError::Config(_))));
    }

    #[test]
    fn test_zero_render_timeout_rejected() {
        let result = ScraperConfig::from_toml_str("render_timeout_secs = 0");
        assert!(matches!(result, Err(XbuddyError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = ScraperConfig::from_toml_str("chunk_size = \"big\"");
        assert!(matches!(result, Err(XbuddyError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xbuddy.toml");
        std::fs::write(&path, "settle_secs = 2\n").unwrap();

        let config = ScraperConfig::load(&path).unwrap();
        assert_eq!(config.settle(), Duration::from_secs(2));

        let missing = ScraperConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(XbuddyError::Io(_))));
    }
}
