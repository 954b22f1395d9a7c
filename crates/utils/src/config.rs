use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration file for srsforward.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub forward: ForwardConfig,
}

/// Forwarding configuration, the values can be overridden from the
/// command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForwardConfig {
    /// Shows what would be done instead of calling sendmail.
    #[serde(default)]
    pub dry_run: bool,

    /// Replacement `$PATH` for the sendmail and postconf invocations.
    #[serde(default)]
    pub path: Option<String>,

    /// Header holding the return-path (`MAIL FROM`) value.
    #[serde(default = "default_rp_header")]
    pub rp_header: String,

    /// Name or path of the sendmail binary.
    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: String,

    /// TCP address of the SRS lookup service.
    #[serde(default = "default_srs_addr")]
    pub srs_addr: String,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            path: None,
            rp_header: default_rp_header(),
            sendmail_path: default_sendmail_path(),
            srs_addr: default_srs_addr(),
        }
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    #[error("Config I/O error: {0}")]
    Io(#[from] io::Error),
    /// A parse error occurred deserializing TOML.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_rp_header() -> String {
    "Return-Path".to_string()
}

fn default_sendmail_path() -> String {
    "sendmail".to_string()
}

fn default_srs_addr() -> String {
    "localhost:10001".to_string()
}
