//! Base configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::BaseError;

/// Base device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Basename requested from the shears after connecting.
    #[serde(default = "default_log_basename")]
    pub log_basename: String,

    /// Request the log automatically as soon as the link is ready.
    #[serde(default = "default_true")]
    pub request_on_connect: bool,

    /// Host serial baud rate (informational; the writer is injected).
    #[serde(default = "default_uplink_baud")]
    pub uplink_baud: u32,
}

fn default_log_basename() -> String {
    "gps_points.csv".into()
}

fn default_true() -> bool {
    true
}

fn default_uplink_baud() -> u32 {
    115_200
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            log_basename: default_log_basename(),
            request_on_connect: default_true(),
            uplink_baud: default_uplink_baud(),
        }
    }
}

impl BaseConfig {
    /// Loads configuration from a TOML file; a missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, BaseError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
