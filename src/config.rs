//! Trie configuration, stored as JSON alongside the database file

use crate::model::KeyHashing;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default digest bits consumed per level (32-way branching)
pub const DEFAULT_BIT_WIDTH: u8 = 5;

/// Largest supported bit width (256-way branching)
pub const MAX_BIT_WIDTH: u8 = 8;

/// Configuration shared by every trie in a database
///
/// Changing `bit_width` or `key_hashing` changes the layout, so existing
/// roots must be read with the configuration they were written with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampConfig {
    /// Digest bits consumed per trie level
    #[serde(default = "default_bit_width")]
    pub bit_width: u8,
    /// How keys are digested
    #[serde(default)]
    pub key_hashing: KeyHashing,
    /// Number of blocks held in the read cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_bit_width() -> u8 {
    DEFAULT_BIT_WIDTH
}

fn default_cache_capacity() -> usize {
    1024
}

impl Default for ChampConfig {
    fn default() -> Self {
        ChampConfig {
            bit_width: DEFAULT_BIT_WIDTH,
            key_hashing: KeyHashing::default(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl ChampConfig {
    pub fn with_bit_width(mut self, bit_width: u8) -> Self {
        self.bit_width = bit_width;
        self
    }

    pub fn with_key_hashing(mut self, key_hashing: KeyHashing) -> Self {
        self.key_hashing = key_hashing;
        self
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.bit_width == 0 || self.bit_width > MAX_BIT_WIDTH {
            return Err(Error::Config(format!(
                "bit_width must be between 1 and {}, got {}",
                MAX_BIT_WIDTH, self.bit_width
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be non-zero".into()));
        }
        Ok(())
    }

    /// Load the config for a database, falling back to defaults
    pub fn load(db_path: &Path) -> Result<Self> {
        let config_path = Self::config_path(db_path);
        let config: ChampConfig = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save the config next to a database
    pub fn save(&self, db_path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(db_path), content)?;
        Ok(())
    }

    /// Get the config file path for a database
    pub fn config_path(db_path: &Path) -> PathBuf {
        let mut config_path = db_path.to_path_buf();
        let file_name = db_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "champ.db".to_string());
        config_path.set_file_name(format!("{}.config", file_name));
        config_path
    }
}
