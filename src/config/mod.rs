//! Configuration module
//!
//! Link settings and their TOML persistence

mod settings;

pub use settings::{LinkConfig, Role};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for a link configuration
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be written as TOML
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No home directory to place the configuration in
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "seriallink", "SerialLink")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "seriallink", "SerialLink")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default link configuration file
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("link.toml"))
}

/// Get the log directory
pub fn log_dir() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs"))
}
