//! Loader configuration: JSON file in the platform config dir, or defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::priority::ThreadPriority;

/// Share of the cache one scan pass may fill before the worker goes idle.
const LOAD_RATIO: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of cached covers.
    pub cache_capacity: usize,
    /// Textures that may wait for GPU destruction before the worker blocks.
    pub delete_buffer_size: usize,
    /// Worker priority while loading near the center.
    pub priority: ThreadPriority,
    /// Override image for covers still loading. Empty = built-in.
    pub loading_image: String,
    /// Override image for positions without a cover. Empty = built-in.
    pub no_cover_image: String,
    /// Covers are downscaled so neither side exceeds this.
    pub max_texture_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            cache_capacity: 150,
            delete_buffer_size: 64,
            priority: ThreadPriority::BelowNormal,
            loading_image: String::new(),
            no_cover_image: String::new(),
            max_texture_size: 512,
        }
    }
}

impl LoaderConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: LoaderConfig =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/covercache/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "covercache")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load the default config file; a missing file means defaults, an
    /// unreadable one is reported and replaced by defaults.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config: {}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity < 1 {
            return Err(ConfigError::Invalid("cache_capacity must be at least 1".into()));
        }
        if self.delete_buffer_size < 1 {
            return Err(ConfigError::Invalid(
                "delete_buffer_size must be at least 1".into(),
            ));
        }
        if self.max_texture_size < 1 {
            return Err(ConfigError::Invalid(
                "max_texture_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Loads per scan pass: `floor((capacity - 1) * 0.8)`, at least one.
    pub fn load_budget(&self) -> usize {
        let budget = (self.cache_capacity.saturating_sub(1) as f64 * LOAD_RATIO) as usize;
        budget.max(1)
    }
}
