//! Link settings

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Which side drives the handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sends SET and DISC, enforces timeouts
    #[default]
    Initiator,
    /// Answers SET and DISC, blocks without timeouts
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Handshake role
    pub role: Role,
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Retransmissions allowed per frame after the first transmission
    pub retry_limit: u32,
    /// Retransmission timeout in milliseconds
    pub timeout_ms: u64,
    /// Largest payload accepted by `send` and `receive`
    pub max_payload_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            role: Role::Initiator,
            port: "/dev/ttyS0".to_string(),
            baud_rate: 38400,
            retry_limit: 3,
            timeout_ms: 3000,
            max_payload_size: 1000,
        }
    }
}

impl LinkConfig {
    /// Create a configuration for `port` with default settings
    pub fn new(port: &str, role: Role) -> Self {
        Self {
            role,
            port: port.to_string(),
            ..Self::default()
        }
    }

    /// Set the role
    #[must_use]
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the baud rate
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the retry limit
    #[must_use]
    pub fn retry_limit(mut self, retries: u32) -> Self {
        self.retry_limit = retries;
        self
    }

    /// Set the retransmission timeout
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the maximum payload size
    #[must_use]
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Retransmission timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the settings before any I/O happens
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid("max_payload_size must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be at least 1".into()));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be at least 1".into()));
        }
        Ok(())
    }

    /// Load a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `link.toml` from the config directory, or defaults if it does not
    /// exist
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}
