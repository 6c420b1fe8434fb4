//! Configuration file support for newtdock.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (NEWTDOCK_*)
//! 3. Local config file (./newtdock.toml)
//! 4. Global config file (~/.config/newtdock/config.toml)
//!
//! An explicit `--config PATH` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use newtdock::{DockConfig, LinkConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
const LOCAL_CONFIG_FILE: &str = "newtdock.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Dock session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockSection {
    /// Keepalive interval announced to the device, in seconds.
    pub keepalive_secs: Option<u32>,
    /// Give up after this many seconds without data (0 waits forever).
    pub idle_timeout_secs: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Dock session configuration.
    #[serde(default)]
    pub dock: DockSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "newtdock").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.dock.keepalive_secs.is_some() {
            self.dock.keepalive_secs = other.dock.keepalive_secs;
        }
        if other.dock.idle_timeout_secs.is_some() {
            self.dock.idle_timeout_secs = other.dock.idle_timeout_secs;
        }
    }

    /// Session values announced to the device.
    pub fn dock_config(&self) -> DockConfig {
        let mut dock = DockConfig::default();
        if let Some(secs) = self.dock.keepalive_secs {
            dock.keepalive_secs = secs;
        }
        dock
    }

    /// Transport pump settings.
    pub fn link_config(&self) -> LinkConfig {
        match self.dock.idle_timeout_secs {
            None => LinkConfig::default(),
            Some(0) => LinkConfig { idle_timeout: None },
            Some(secs) => LinkConfig {
                idle_timeout: Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.serial.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.dock.keepalive_secs.is_none());
        assert!(config.dock.idle_timeout_secs.is_none());
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.connection.baud = Some(9600);

        let mut other = Config::default();
        other.connection.serial = Some("/dev/ttyUSB0".to_string());
        other.connection.baud = Some(38400);
        other.dock.keepalive_secs = Some(60);

        base.merge(other);

        assert_eq!(base.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(38400));
        assert_eq!(base.dock.keepalive_secs, Some(60));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.serial = Some("/dev/ttyUSB0".to_string());
        base.dock.idle_timeout_secs = Some(30);

        base.merge(Config::default());

        assert_eq!(base.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.dock.idle_timeout_secs, Some(30));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
serial = "/dev/ttyUSB0"
baud = 38400

[dock]
keepalive_secs = 45
idle_timeout_secs = 120
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.connection.baud, Some(38400));
        assert_eq!(config.dock.keepalive_secs, Some(45));
        assert_eq!(config.dock.idle_timeout_secs, Some(120));
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config: Config = toml::from_str("[dock]\nkeepalive_secs = 10\n").unwrap();
        assert!(config.connection.serial.is_none());
        assert_eq!(config.dock.keepalive_secs, Some(10));
    }

    // ---- Derived library settings ----

    #[test]
    fn test_dock_config_defaults_and_override() {
        let mut config = Config::default();
        assert_eq!(config.dock_config().keepalive_secs, 30);
        config.dock.keepalive_secs = Some(90);
        assert_eq!(config.dock_config().keepalive_secs, 90);
        assert_eq!(config.dock_config().session_type, 4);
    }

    #[test]
    fn test_link_config_idle_timeout() {
        let mut config = Config::default();
        assert_eq!(
            config.link_config().idle_timeout,
            Some(Duration::from_secs(90))
        );

        config.dock.idle_timeout_secs = Some(0);
        assert_eq!(config.link_config().idle_timeout, None);

        config.dock.idle_timeout_secs = Some(15);
        assert_eq!(
            config.link_config().idle_timeout,
            Some(Duration::from_secs(15))
        );
    }

    // ---- load_from_path ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[connection]\nserial = \"/dev/ttyUSB1\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB1"));
    }

    #[test]
    fn test_load_from_path_invalid_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            let s = p.to_string_lossy();
            assert!(s.contains("newtdock"));
            assert!(s.ends_with("config.toml"));
        }
    }
}
