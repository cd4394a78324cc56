//! # SerialLink Core Library
//!
//! A reliable stop-and-wait data link over an unreliable byte channel:
//! - HDLC-style framing with byte stuffing and XOR checksums
//! - SET/UA connection setup and DISC/DISC/UA teardown
//! - Retransmission on timeout and REJ, duplicate suppression
//! - Serial ports, in-memory loopback pairs and bit-error injection
//!
//! ## Example
//!
//! ```rust,no_run
//! use seriallink_core::{Connection, LinkConfig, Role};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LinkConfig::new("/dev/ttyUSB0", Role::Initiator).timeout_ms(1000);
//!     let mut link = Connection::open(&config)?;
//!
//!     link.send(b"hello")?;
//!
//!     let stats = link.close()?;
//!     println!("{}", stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{ConfigError, LinkConfig, Role};
pub use crate::core::link::{Connection, LinkError, LinkState, LinkStats};
pub use crate::core::protocol::{Control, DecodeError, Frame, SeqBit};
pub use crate::core::timer::RetryTimer;
pub use crate::core::transport::{
    BitErrorChannel, BitErrorConfig, Channel, ChannelError, LoopbackChannel, SerialChannel,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
