//! CLI Exit Codes
//!
//! Process exit codes for scripted transfers.

use crate::config::ConfigError;
use crate::core::link::LinkError;
use crate::core::transport::ChannelError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection handshake failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Disconnect handshake failed
    pub const DISCONNECT_FAILED: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Channel I/O error
    pub const CHANNEL_ERROR: u8 = 9;

    /// Frame never acknowledged
    pub const TRANSFER_FAILED: u8 = 10;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success
    Success,

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Success
    pub fn success() -> Self {
        Self::Success
    }

    /// Error with an exit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Error message, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Error(_, msg) => Some(msg),
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let code = match err.kind() {
            ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
            ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
            _ => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<ChannelError> for CliResult {
    fn from(err: ChannelError) -> Self {
        let code = match err {
            ChannelError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            ChannelError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            _ => ExitCodes::CHANNEL_ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<LinkError> for CliResult {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Channel(err) => err.into(),
            LinkError::Config(err) => err.into(),
            LinkError::ConnectFailed { .. } => {
                Self::Error(ExitCodes::CONNECTION_FAILED, err.to_string())
            }
            LinkError::DisconnectFailed { .. } => {
                Self::Error(ExitCodes::DISCONNECT_FAILED, err.to_string())
            }
            LinkError::MaxRetriesExceeded { .. } => {
                Self::Error(ExitCodes::TRANSFER_FAILED, err.to_string())
            }
            LinkError::PayloadTooLarge { .. } => {
                Self::Error(ExitCodes::INVALID_ARGS, err.to_string())
            }
        }
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Disconnect failed",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Channel error",
        10 => "Transfer failed",
        14 => "Port not found",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 6, 7, 8, 9, 10, 14] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert_eq!(success.code(), ExitCodes::SUCCESS);
        assert_eq!(success.message(), None);

        let error = CliResult::error(3, "Connection failed");
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
    }

    #[test]
    fn test_from_link_error() {
        let result = CliResult::from(LinkError::ConnectFailed { attempts: 4 });
        assert_eq!(result.code(), ExitCodes::CONNECTION_FAILED);
        assert_eq!(result.message(), Some("Connection failed after 4 attempts"));

        let result = CliResult::from(LinkError::MaxRetriesExceeded { attempts: 4 });
        assert_eq!(result.code(), ExitCodes::TRANSFER_FAILED);

        let result = CliResult::from(LinkError::from(ChannelError::PortNotFound("COM9".into())));
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);

        let result = CliResult::from(LinkError::from(ConfigError::NoConfigDir));
        assert_eq!(result.code(), ExitCodes::CONFIG_ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::TRANSFER_FAILED), "Transfer failed");
        assert_eq!(exit_code_description(127), "Unknown error");
    }
}
