//! Application configuration management.
//!
//! Handles loading, saving, and managing application-wide settings,
//! including the last library root that was opened.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, FileSystemError, Result};
use crate::fixer::TagLimits;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Library root opened last.
    #[serde(default)]
    pub last_root: Option<PathBuf>,
    /// Drop playlist entries whose file is missing instead of failing.
    #[serde(default)]
    pub skip_missing_entries: bool,
    /// Length limits for sanitised tag fields.
    #[serde(default)]
    pub tag_limits: TagLimits,
}

impl AppConfig {
    /// Load configuration from the default location, creating it with
    /// defaults if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed,
    /// or the defaults cannot be written.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {}",
                config_path.display()
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: config_path.to_path_buf(),
                reason: format!("Failed to read config file: {e}"),
            })
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", config_path.display());
        if let Some(root) = &config.last_root {
            debug!("Last library root: {}", root.display());
        }

        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create config directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: config_path.to_path_buf(),
                reason: format!("Failed to write config file: {e}"),
            })
        })?;

        debug!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Remember `root` as the last opened library.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a usable directory.
    pub fn set_last_root(&mut self, root: &Path) -> Result<()> {
        let root = validate_root(root)?;
        info!("Updated last library root to: {}", root.display());
        self.last_root = Some(root);
        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("bluesync")
        .join("config.json")
}

/// Validate that a directory can serve as a library root.
///
/// Returns the canonical path.
///
/// # Errors
///
/// Returns an error if the path does not exist or is not a directory.
pub fn validate_root(path: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path).map_err(|e| {
        Error::Configuration(format!(
            "Library root is not accessible: {} ({})",
            path.display(),
            e
        ))
    })?;

    if !canonical.is_absolute() {
        return Err(Error::Configuration(
            "Library root must be an absolute path".to_string(),
        ));
    }

    if !canonical.is_dir() {
        return Err(Error::Configuration(format!(
            "Path exists but is not a directory: {}",
            canonical.display()
        )));
    }

    Ok(canonical)
}

/// Configuration manager that handles loading and caching config.
#[derive(Debug)]
pub struct ConfigManager {
    config: AppConfig,
    path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager, loading config from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn new() -> Result<Self> {
        Self::with_path(config_file_path())
    }

    /// Create a config manager backed by `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_from(&path)?;
        Ok(Self { config, path })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the last library root, if one was saved.
    #[must_use]
    pub fn last_root(&self) -> Option<&Path> {
        self.config.last_root.as_deref()
    }

    /// Update the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved root is invalid or the config cannot be saved.
    pub fn update(&mut self, mut config: AppConfig) -> Result<()> {
        if let Some(root) = config.last_root.take() {
            config.last_root = Some(validate_root(&root)?);
        }
        self.config = config;
        self.config.save_to(&self.path)
    }

    /// Update just the last library root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is invalid or config cannot be saved.
    pub fn set_last_root(&mut self, root: &Path) -> Result<()> {
        self.config.set_last_root(root)?;
        self.config.save_to(&self.path)
    }

    /// Reset to default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be saved.
    pub fn reset(&mut self) -> Result<()> {
        self.config = AppConfig::default();
        self.config.save_to(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.last_root.is_none());
        assert!(!config.skip_missing_entries);
        assert_eq!(config.tag_limits.album, 14);
        assert_eq!(config.tag_limits.artist, 14);
        assert_eq!(config.tag_limits.title, 30);
    }

    #[test]
    fn test_load_from_creates_default() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested").join("config.json");

        let config = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");

        let config = AppConfig {
            last_root: Some(PathBuf::from("/media/usb")),
            skip_missing_entries: true,
            ..Default::default()
        };
        config.save_to(&path).expect("Should save");

        let loaded = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let json = r#"{"last_root":"/custom/path"}"#;
        let config: AppConfig = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(config.last_root, Some(PathBuf::from("/custom/path")));
        assert_eq!(config.tag_limits, TagLimits::default());
    }

    #[test]
    fn test_corrupt_config_is_configuration_error() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{not json").expect("Should write file");

        let result = AppConfig::load_from(&path);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_validate_root() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let root = validate_root(temp_dir.path()).expect("Should validate");
        assert!(root.is_absolute());

        assert!(validate_root(&temp_dir.path().join("missing")).is_err());

        let file_path = temp_dir.path().join("not_a_directory");
        fs::write(&file_path, "test content").expect("Should write file");
        let err_msg = validate_root(&file_path)
            .expect_err("file is not a root")
            .to_string();
        assert!(err_msg.contains("not a directory"));
    }

    #[test]
    fn test_config_manager_set_last_root_persists() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let config_path = temp_dir.path().join("config.json");
        let library = temp_dir.path().join("library");
        fs::create_dir_all(&library).expect("Should create dir");

        let mut manager = ConfigManager::with_path(config_path.clone()).expect("Should load");
        manager.set_last_root(&library).expect("Should save");

        let reloaded = ConfigManager::with_path(config_path).expect("Should load");
        assert_eq!(
            reloaded.last_root(),
            Some(fs::canonicalize(&library).expect("canonical").as_path())
        );
    }

    #[test]
    fn test_config_file_path_uses_correct_name() {
        let path = AppConfig::config_file_path();
        assert!(path.to_string_lossy().ends_with("config.json"));
        assert!(path.to_string_lossy().contains("bluesync"));
    }
}
