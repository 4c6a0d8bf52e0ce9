use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding every on-disk store (created on demand).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base64-encoded 256-bit key for the encrypted store. Without it
    /// the encrypted backend reports itself unavailable.
    #[serde(default)]
    pub secure_key_base64: Option<String>,

    /// Fall back to in-memory stores when a document backend cannot
    /// open its file.
    #[serde(default = "default_true")]
    pub fallback_to_memory: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        secure_key_base64: None,
        fallback_to_memory: default_true(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("polystore-data")
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: default_storage(),
            logging: default_logging(),
        }
    }
}

impl Config {
    /// Load a TOML config file. A missing or unparsable file degrades
    /// to the defaults rather than failing startup.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }
}
