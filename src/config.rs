use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub search: SearchConfig,
    pub suggest: SuggestConfig,
    pub icons: IconsConfig,
}

/// Search engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search URL template; `{}` is replaced with the encoded query
    pub engine_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine_url: "https://www.google.com/search?q={}".to_string(),
        }
    }
}

/// Suggestion endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Suggestion URL template; `{}` is replaced with the encoded query
    pub endpoint: String,
    /// Input inactivity before a remote fetch, in milliseconds
    pub debounce_ms: u64,
    /// HTTP timeout for suggestion requests, in seconds
    pub timeout_secs: u64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://suggestqueries.google.com/complete/search?client=firefox&q={}"
                .to_string(),
            debounce_ms: 300,
            timeout_secs: 5,
        }
    }
}

/// Favicon fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig {
    /// Favicon URL template; `{}` is replaced with the hostname
    pub favicon_url: String,
    /// HTTP timeout for favicon requests, in seconds
    pub timeout_secs: u64,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            favicon_url: "https://favicon.im/{}".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Configuration file loader
pub struct ConfigLoader {
    config_path: PathBuf,
    config: Config,
}

impl ConfigLoader {
    /// Create a new config loader with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            config: Config::default(),
        }
    }

    /// Load configuration from disk, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        let config = if config_path.exists() {
            info!("Loading config from {:?}", config_path);
            let contents = fs::read_to_string(&config_path)?;

            match toml::from_str::<Config>(&contents) {
                Ok(cfg) => {
                    info!("Config loaded successfully");
                    cfg
                }
                Err(e) => {
                    warn!("Failed to parse config: {}, using defaults", e);
                    Config::default()
                }
            }
        } else {
            info!(
                "No config file found, creating default at {:?}",
                config_path
            );
            let default = Config::default();

            if let Err(e) = Self::save_config(&config_path, &default) {
                warn!("Failed to create default config: {}", e);
            }

            default
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Save current configuration to disk
    #[allow(dead_code)]
    pub fn save(&self) -> Result<()> {
        Self::save_config(&self.config_path, &self.config)
    }

    /// Default configuration file path
    fn default_config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp"));

        config_dir.join("freshtab").join("config.toml")
    }

    /// Save configuration to specified path
    fn save_config(path: &PathBuf, config: &Config) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(config)?;
        fs::write(path, toml)?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    /// Get config file path
    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
