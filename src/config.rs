//! Configuration file handling for bilancial.
//!
//! The configuration file is stored at `$BILANCIAL_HOME/config.json`. It names the ledger file,
//! the persisted category overlay and the separator used when category paths are written as a
//! single string.

use crate::error::Res;
use crate::model::DEFAULT_SEPARATOR;
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "bilancial";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const LEDGER_JSON: &str = "ledger.json";
const OVERLAY_JSON: &str = "overlay.json";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$BILANCIAL_HOME` and from there it loads `$BILANCIAL_HOME/config.json`. Relative
/// paths in the file are resolved against the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory and an initial `config.json` with default settings.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail, or if a config file already exists.
    pub async fn create(dir: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the bilancial home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.is_file() {
            bail!("A config file already exists at '{}'", config_path.display())
        }
        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// Validates that `home` exists and holds a config file, then loads it.
    pub async fn load(home: impl Into<PathBuf>) -> Res<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("Bilancial home is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.config_file.ledger_path)
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.resolve(&self.config_file.overlay_path())
    }

    pub fn category_separator(&self) -> &str {
        &self.config_file.category_separator
    }

    /// Returns `p` unchanged if it is absolute, otherwise joins it to the home directory.
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            return p.to_path_buf();
        }
        self.root.join(p)
    }
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "bilancial",
///   "config_version": 1,
///   "ledger_path": "ledger.json",
///   "overlay_path": "overlay.json",
///   "category_separator": ":"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "bilancial"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Path to the ledger file (relative to the home directory or absolute)
    ledger_path: PathBuf,

    /// Path to the persisted category overlay (relative to the home directory or absolute)
    /// Defaults to $BILANCIAL_HOME/overlay.json if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overlay_path: Option<PathBuf>,

    /// Separator between the segments of a category path written as one string
    #[serde(default = "default_separator")]
    category_separator: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            ledger_path: PathBuf::from(LEDGER_JSON),
            overlay_path: None,
            category_separator: default_separator(),
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if it belongs to another app.
    pub async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            !config.category_separator.is_empty(),
            "The category_separator in the config file must not be empty"
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    /// Gets the overlay path, `overlay.json` if None.
    pub fn overlay_path(&self) -> PathBuf {
        self.overlay_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(OVERLAY_JSON))
    }
}
