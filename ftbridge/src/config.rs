//! Configuration for ftbridge tools.
//!
//! Loaded from a TOML file. Every field has a default, so an empty or
//! missing file yields a usable configuration; command-line flags override
//! whatever the file says.
//!
//! ```toml
//! [device]
//! serial = "FT1A2B3C"
//! clock = "80mhz"
//!
//! [i2c]
//! speed = "100k"
//!
//! [display]
//! address = 0x3D
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::{ClockRate, I2cSpeed, SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "FTBRIDGE_CONFIG";

const CONFIG_DIR: &str = "ftbridge";
const CONFIG_FILE: &str = "ftbridge.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: DeviceConfig,
    pub i2c: I2cConfig,
    pub display: DisplayConfig,
    pub rtc: RtcConfig,
    pub scan: ScanConfig,
}

/// Which bridge to open and how to set it up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Vendor-list index; ignored when `serial` is set
    pub index: u32,
    /// Open by serial number instead of index
    pub serial: Option<String>,
    /// System clock to select after opening; chip default when unset
    pub clock: Option<ClockRate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct I2cConfig {
    pub speed: I2cSpeed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub address: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            address: crate::display::DEFAULT_ADDRESS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RtcConfig {
    pub address: u8,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            address: crate::peripheral::pcf8523::DEFAULT_ADDRESS,
        }
    }
}

/// Address range covered by a bus scan, inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub start: u8,
    pub end: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start: SCAN_FIRST_ADDRESS,
            end: SCAN_LAST_ADDRESS,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults.
    ///
    /// An explicit `FTBRIDGE_CONFIG` must point at a readable file; the
    /// per-user location is optional.
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }
        match user_config_path(|key| env::var(key).ok()) {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse one file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// `$XDG_CONFIG_HOME/ftbridge/ftbridge.toml`, else
/// `$HOME/.config/ftbridge/ftbridge.toml`.
fn user_config_path(var: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let base = match var("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(var("HOME")?).join(".config"),
    };
    Some(base.join(CONFIG_DIR).join(CONFIG_FILE))
}
