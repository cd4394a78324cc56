//! Byte channels the link layer runs over
//!
//! Supports:
//! - Serial ports (RS-232, USB-Serial adapters)
//! - In-memory loopback pairs
//! - Bit-error injection around any other channel

mod loopback;
mod noisy;
mod serial;

pub use loopback::LoopbackChannel;
pub use noisy::{BitErrorChannel, BitErrorConfig};
pub use serial::{list_ports, SerialChannel};

use std::time::Instant;
use thiserror::Error;

/// Channel error types
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port could not be opened
    #[error("Failed to open channel: {0}")]
    Open(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The other end went away
    #[error("Disconnected")]
    Disconnected,
}

/// A raw, unreliable, byte-oriented duplex channel
///
/// A channel is owned by exactly one [`crate::core::link::Connection`].
#[cfg_attr(test, mockall::automock)]
pub trait Channel: Send {
    /// Write every byte of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError>;

    /// Read one byte, blocking until `deadline`
    ///
    /// Returns `Ok(None)` once the deadline has passed without data. A `None`
    /// deadline blocks until a byte arrives or the channel fails.
    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError>;

    /// Connection info string for logs
    fn describe(&self) -> String {
        "channel".to_string()
    }
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        (**self).write_all(data)
    }

    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError> {
        (**self).read_byte(deadline)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
