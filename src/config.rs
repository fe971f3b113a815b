//! Configuration module
//!
//! Site origin, request headers, time budgets and converter options. Values
//! come from a TOML file when one is present and fall back to defaults that
//! match the catalog site this tool was written against.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The base URL cannot serve as an origin for relative paths
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Complete configuration for a harvesting run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Catalog site origin and request headers
    pub site: SiteConfig,
    /// Time budgets for fetching and crawling
    pub timing: TimingConfig,
    /// Headless browser settings
    pub render: RenderConfig,
    /// Metadata conversion options
    pub metalink: MetalinkConfig,
}

/// The catalog site and the headers sent with plain requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: Url,
    /// Path of the search endpoint, queried with `?q=<term>`
    pub search_path: String,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://www3.animeflv.net").expect("default base URL is valid"),
            search_path: "/browse".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                .to_string(),
            accept_language: "es-ES,es;q=0.8,en-US;q=0.5,en;q=0.3".to_string(),
        }
    }
}

/// Time budgets, in seconds unless the field says otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub listing_render_timeout_secs: u64,
    pub listing_settle_secs: u64,
    pub episode_render_timeout_secs: u64,
    pub episode_settle_secs: u64,
    pub plain_timeout_secs: u64,
    /// Pause between two episode fetches during a crawl
    pub episode_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            listing_render_timeout_secs: 25,
            listing_settle_secs: 3,
            episode_render_timeout_secs: 20,
            episode_settle_secs: 2,
            plain_timeout_secs: 15,
            episode_pause_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn plain_timeout(&self) -> Duration {
        Duration::from_secs(self.plain_timeout_secs)
    }

    pub fn episode_pause(&self) -> Duration {
        Duration::from_millis(self.episode_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// When false, every fetch goes straight to a plain request
    pub enabled: bool,
    /// Explicit Chromium binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chrome_path: None,
        }
    }
}

/// Options for turning a text report into a metalink document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetalinkConfig {
    /// Highest episode number written to the document
    pub episode_cap: u32,
    /// Substring an `Enlace:` URL must contain to be captured
    pub link_marker: String,
    /// Size written for every file entry, in bytes
    pub estimated_size: u64,
}

impl Default for MetalinkConfig {
    fn default() -> Self {
        Self {
            episode_cap: 12,
            link_marker: "mega.nz".to_string(),
            // 350 MiB, a typical size for one subtitled episode
            estimated_size: 367_001_600,
        }
    }
}

impl HarvesterConfig {
    /// Loads the configuration
    ///
    /// An explicit path must exist. Without one, the platform config
    /// directory is checked for `config.toml`; if that is missing too,
    /// defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };

        let config = match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Replaces the site origin, e.g. from a command-line flag
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.site.base_url =
            Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl(e.to_string()))?;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.site.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(self.site.base_url.to_string()));
        }
        Ok(())
    }
}

/// Location of the optional configuration file
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "link_harvester")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
