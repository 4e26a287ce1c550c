use crate::core::db::EncryptionMode;
use crate::core::{Result, SyncqlError};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub logging: Option<LoggingConfig>,
}

/// Store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    /// Directory holding the database file; the documents directory when unset
    pub directory: Option<PathBuf>,
    pub mode: EncryptionMode,
    pub secret: String,
    pub new_secret: String,
    pub version: i32,
    pub encrypted: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: "syncql".to_string(),
            directory: None,
            mode: EncryptionMode::NoEncryption,
            secret: String::new(),
            new_secret: String::new(),
            version: 1,
            encrypted: false,
        }
    }
}

impl DatabaseConfig {
    /// Settings for a plain store called `name`.
    pub fn named(name: impl Into<String>) -> Self {
        DatabaseConfig {
            name: name.into(),
            ..DatabaseConfig::default()
        }
    }

    /// Rejects combinations that can never open.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SyncqlError::Config("database name is empty".to_string()));
        }
        if self.mode.requires_cipher() && self.secret.is_empty() {
            return Err(SyncqlError::Config(format!(
                "mode '{}' requires a secret",
                self.mode
            )));
        }
        if self.mode == EncryptionMode::NewSecret && self.new_secret.is_empty() {
            return Err(SyncqlError::Config(
                "mode 'newsecret' requires new_secret".to_string(),
            ));
        }
        if self.version < 1 {
            return Err(SyncqlError::Config(format!(
                "version must be at least 1, got {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl Config {
    /// The configured log level, `info` when unset.
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .as_ref()
            .and_then(|l| l.level.as_deref())
            .and_then(|level| level.parse().ok())
            .unwrap_or(tracing::Level::INFO)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = syncql::config::load_config("syncql.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        SyncqlError::Config(format!("{}: {}", path.as_ref().display(), e))
    })?;
    parse_config(&content)
}

/// Parses and validates configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).map_err(|e| SyncqlError::Config(e.to_string()))?;
    config.database.validate()?;
    Ok(config)
}
