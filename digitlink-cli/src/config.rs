//! Configuration file support for digitlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (DIGITLINK_*)
//! 3. Local config file (./digitlink.toml)
//! 4. Global config file (~/.config/digitlink/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 9600
//!
//! [transfer]
//! mode = "strict"
//! retries = 3
//! ack_timeout_ms = 2000
//! ready_timeout_ms = 10000
//! response_timeout_ms = 2000
//! ```

use clap::ValueEnum;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local config file name.
pub const LOCAL_CONFIG: &str = "digitlink.toml";

/// Transfer protocol selectable from the command line or config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Framed transfer with checksum, ack and retry.
    #[default]
    Strict,
    /// READY handshake with paced raw writes.
    Loose,
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Transfer protocol.
    pub mode: Option<Mode>,
    /// Attempts per frame (strict).
    pub retries: Option<u32>,
    /// Ack deadline per attempt in milliseconds (strict).
    pub ack_timeout_ms: Option<u64>,
    /// Readiness deadline in milliseconds (loose).
    pub ready_timeout_ms: Option<u64>,
    /// Reply deadline in milliseconds.
    pub response_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
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
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
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
            Ok(content) => Self::parse(&content)
                .map_err(|e| warn!("Failed to parse config file {}: {}", path.display(), e))
                .ok(),
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Parse TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "digitlink").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        let Self {
            connection,
            transfer,
        } = other;

        if connection.port.is_some() {
            self.connection.port = connection.port;
        }
        if connection.baud.is_some() {
            self.connection.baud = connection.baud;
        }

        if transfer.mode.is_some() {
            self.transfer.mode = transfer.mode;
        }
        if transfer.retries.is_some() {
            self.transfer.retries = transfer.retries;
        }
        if transfer.ack_timeout_ms.is_some() {
            self.transfer.ack_timeout_ms = transfer.ack_timeout_ms;
        }
        if transfer.ready_timeout_ms.is_some() {
            self.transfer.ready_timeout_ms = transfer.ready_timeout_ms;
        }
        if transfer.response_timeout_ms.is_some() {
            self.transfer.response_timeout_ms = transfer.response_timeout_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.transfer.mode.is_none());
        assert!(config.transfer.retries.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let config = Config::parse(
            r#"
[connection]
port = "/dev/ttyUSB0"
baud = 115200

[transfer]
mode = "loose"
ready_timeout_ms = 5000
"#,
        )
        .unwrap();

        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.connection.baud, Some(115200));
        assert_eq!(config.transfer.mode, Some(Mode::Loose));
        assert_eq!(config.transfer.ready_timeout_ms, Some(5000));
        assert!(config.transfer.ack_timeout_ms.is_none());
    }

    #[test]
    fn test_config_from_partial_toml() {
        let config = Config::parse("[transfer]\nretries = 5\n").unwrap();
        assert!(config.connection.port.is_none());
        assert_eq!(config.transfer.retries, Some(5));
    }

    #[test]
    fn test_config_rejects_unknown_mode() {
        assert!(Config::parse("[transfer]\nmode = \"turbo\"\n").is_err());
    }

    #[test]
    fn test_config_merge_overrides_set_values() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(9600);

        let mut other = Config::default();
        other.connection.baud = Some(115200);
        other.transfer.mode = Some(Mode::Loose);

        base.merge(other);
        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(115200));
        assert_eq!(base.transfer.mode, Some(Mode::Loose));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.transfer.retries = Some(4);
        base.transfer.response_timeout_ms = Some(1500);

        base.merge(Config::default());
        assert_eq!(base.transfer.retries, Some(4));
        assert_eq!(base.transfer.response_timeout_ms, Some(1500));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nport = \"COM3\"").unwrap();

        let config = Config::load_from_path(file.path());
        assert_eq!(config.connection.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_load_from_invalid_path_falls_back_to_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml [[[").unwrap();
        assert!(
            Config::load_from_path(file.path())
                .connection
                .port
                .is_none()
        );

        let missing = Config::load_from_path(Path::new("/nonexistent/digitlink.toml"));
        assert!(missing.connection.port.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyACM0".to_string());
        config.transfer.mode = Some(Mode::Strict);

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("mode = \"strict\""));
        let parsed = Config::parse(&text).unwrap();
        assert_eq!(parsed.connection.port, config.connection.port);
    }
}
