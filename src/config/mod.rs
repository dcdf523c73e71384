//! # Configuration Module
//!
//! Two kinds of configuration live here:
//!
//! - [`Config`] - typed application settings loaded from TOML (storage backend,
//!   migration toggle, logging).
//! - [`ConfigNode`] / [`ConfigFile`] - a dynamic tree with dotted-path access,
//!   typed getters and placeholder injection. The migration manifest and the
//!   flat-file backend are stored this way.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//! handler = "sqlite"
//! perform-data-migration = true
//!
//! [logging]
//! level = "info"
//! file = "profiled.log"
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use profiled::config::{Config, ConfigNode, ConfigType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Backend: {}", config.storage.handler);
//!
//!     let mut tree = ConfigNode::new(ConfigType::Json);
//!     tree.set("rewards.daily.coins", 50);
//!     assert_eq!(tree.get_int("rewards.daily.coins"), Some(50));
//!     Ok(())
//! }
//! ```

pub mod file;
pub mod placeholder;
pub mod tree;
pub mod value;

pub use file::ConfigFile;
pub use placeholder::StaticPlaceholder;
pub use tree::{ConfigEntry, ConfigNode, ConfigType};
pub use value::{Value, ValueMap};

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::data::HandlerType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Active backend. Changing it with migration enabled moves all data on
    /// the next start.
    #[serde(default)]
    pub handler: HandlerType,
    #[serde(default, rename = "perform-data-migration")]
    pub perform_data_migration: bool,
    /// Optional override for the flat-file backend; defaults to `<data_dir>/profiles.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_file: Option<String>,
    /// Optional override for the SQLite database; defaults to `<data_dir>/profiles.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_file: Option<String>,
    /// Optional override for the sled directory; defaults to `<data_dir>/profiles.sled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sled_dir: Option<String>,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

fn default_manifest_file() -> String {
    "data.json".to_string()
}

impl StorageConfig {
    pub fn new(data_dir: impl AsRef<Path>, handler: HandlerType) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_string_lossy().into_owned(),
            handler,
            perform_data_migration: false,
            json_file: None,
            sqlite_file: None,
            sled_dir: None,
            manifest_file: default_manifest_file(),
        }
    }

    pub fn with_migration(mut self, enabled: bool) -> Self {
        self.perform_data_migration = enabled;
        self
    }

    fn resolve(&self, custom: Option<&String>, default_name: &str) -> PathBuf {
        match custom {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => Path::new(&self.data_dir).join(p),
            None => Path::new(&self.data_dir).join(default_name),
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.resolve(self.json_file.as_ref(), "profiles.json")
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.resolve(self.sqlite_file.as_ref(), "profiles.db")
    }

    pub fn sled_path(&self) -> PathBuf {
        self.resolve(self.sled_dir.as_ref(), "profiles.sled")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(Some(&self.manifest_file), "data.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::new("./data", HandlerType::default()),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("profiled.log".to_string()),
            },
        }
    }
}
