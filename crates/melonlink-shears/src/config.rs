//! Shears configuration.
//!
//! Stored as TOML next to the other device state; every field has a
//! default so an empty file (or none at all) yields a working device.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ShearsError;

/// Shears device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShearsConfig {
    /// Mounted storage prefix holding the CSV log.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Basename of the CSV log under the storage prefix.
    #[serde(default = "default_log_basename")]
    pub log_basename: String,

    /// GPS UART baud rate (informational; the byte stream is injected).
    #[serde(default = "default_gps_baud")]
    pub gps_baud: u32,
}

fn default_storage_dir() -> PathBuf {
    "/storage".into()
}

fn default_log_basename() -> String {
    "gps_points.csv".into()
}

fn default_gps_baud() -> u32 {
    115_200
}

impl Default for ShearsConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            log_basename: default_log_basename(),
            gps_baud: default_gps_baud(),
        }
    }
}

impl ShearsConfig {
    /// Loads configuration from a TOML file; a missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, ShearsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Full path of the CSV log file.
    pub fn log_path(&self) -> PathBuf {
        self.storage_dir.join(&self.log_basename)
    }
}
