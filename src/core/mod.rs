//! Core module containing the link layer
//!
//! This module provides:
//! - Transport layer for byte channels (serial, loopback, bit-error injection)
//! - Frame codec, handshake and stop-and-wait ARQ
//! - Retransmission timer
//! - Connection lifecycle and statistics

pub mod link;
pub mod protocol;
pub mod timer;
pub mod transport;
