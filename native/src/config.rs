// Device settings and their on-disk JSON form.

use crate::ipc::PIPE_NAME;
use arc_swap::ArcSwap;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const SETTINGS_DIR: &str = "EvgaPipeBridge";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config directory not accessible")]
    ConfigDirError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Master switch for driving peripheral devices at all.
    pub allow_peripheral_devices: bool,
    pub pipe_name: String,
    pub write_timeout_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            allow_peripheral_devices: true,
            pipe_name: PIPE_NAME.to_string(),
            write_timeout_ms: 250,
        }
    }
}

impl DeviceSettings {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// `<config dir>/EvgaPipeBridge/settings.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
            .ok_or(ConfigError::ConfigDirError)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("[CONFIG] No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        info!("[CONFIG] Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Shared, hot-swappable settings.
///
/// Reads never block; the update engine loads the current value every frame.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    current: Arc<ArcSwap<DeviceSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn load(&self) -> Arc<DeviceSettings> {
        self.current.load_full()
    }

    pub fn allow_peripheral_devices(&self) -> bool {
        self.current.load().allow_peripheral_devices
    }

    pub fn set_allow_peripheral_devices(&self, allow: bool) {
        self.current.rcu(|settings| {
            let mut next = DeviceSettings::clone(settings);
            next.allow_peripheral_devices = allow;
            next
        });
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(DeviceSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DeviceSettings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, DeviceSettings::default());
        assert!(settings.allow_peripheral_devices);
        assert_eq!(settings.pipe_name, "AuroraEVGA");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);

        let settings = DeviceSettings {
            allow_peripheral_devices: false,
            pipe_name: "CustomPipe".to_string(),
            write_timeout_ms: 40,
        };
        settings.save(&path).unwrap();

        assert_eq!(DeviceSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{ "allow_peripheral_devices": false }"#).unwrap();

        let settings = DeviceSettings::load(&path).unwrap();
        assert!(!settings.allow_peripheral_devices);
        assert_eq!(settings.write_timeout_ms, 250);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            DeviceSettings::load(&path),
            Err(ConfigError::JsonError(_))
        ));
    }

    #[test]
    fn test_handle_toggle_is_visible_to_clones() {
        let handle = SettingsHandle::default();
        let shared = handle.clone();

        handle.set_allow_peripheral_devices(false);
        assert!(!shared.allow_peripheral_devices());
        assert_eq!(shared.load().pipe_name, "AuroraEVGA");
    }
}
