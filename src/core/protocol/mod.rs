//! Link protocol implementation
//!
//! Provides the wire format and the state machines of the stop-and-wait link:
//! - Frame codec (byte stuffing, BCC1/BCC2 checksums)
//! - Supervisory frame recognizer (SET/UA/DISC/RR/REJ)
//! - Connection establishment and teardown per role
//! - ARQ sender and receiver

pub mod frame;
pub mod handshake;
pub mod receiver;
pub mod recognizer;
pub mod sender;

pub use frame::{bcc2, decode, destuff, encode, stuff, DecodeError, Frame};
pub use receiver::ArqReceiver;
pub use recognizer::{RecognizerState, SupervisoryRecognizer};
pub use sender::ArqSender;

use std::fmt;

// ============ Wire constants ============

/// Frame delimiter (FLAG)
pub const TERM: u8 = 0x7E;
/// Escape byte used by byte stuffing
pub const ESC: u8 = 0x7D;
/// XOR mask applied to an escaped byte
pub const ESC_MASK: u8 = 0x20;
/// Address byte, used in both directions
pub const ADDRESS: u8 = 0x03;

/// Length of a supervisory frame on the wire
pub const SUPERVISORY_LEN: usize = 5;

const C_SET: u8 = 0x03;
const C_UA: u8 = 0x07;
const C_DISC: u8 = 0x0B;
const C_I: u8 = 0x00;
const C_RR: u8 = 0x05;
const C_REJ: u8 = 0x01;
const SEQ_SHIFT: u8 = 7;

/// Header checksum: address XOR control
pub fn bcc1(address: u8, control: u8) -> u8 {
    address ^ control
}

/// One-bit sequence number of the stop-and-wait protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeqBit {
    /// Sequence bit 0
    #[default]
    Zero,
    /// Sequence bit 1
    One,
}

impl SeqBit {
    /// The other sequence bit
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    /// Bit value (0 or 1)
    pub fn bit(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }

    fn from_bit(bit: u8) -> Self {
        if bit == 0 {
            Self::Zero
        } else {
            Self::One
        }
    }
}

impl fmt::Display for SeqBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bit())
    }
}

/// Control field of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Connection request
    Set,
    /// Unnumbered acknowledgement
    Ua,
    /// Disconnect
    Disc,
    /// Information frame carrying a payload
    Info(SeqBit),
    /// Receiver ready (positive acknowledgement)
    Rr(SeqBit),
    /// Reject (negative acknowledgement)
    Rej(SeqBit),
}

impl Control {
    /// Encode to the control byte used on the wire
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Set => C_SET,
            Self::Ua => C_UA,
            Self::Disc => C_DISC,
            Self::Info(seq) => C_I | (seq.bit() << SEQ_SHIFT),
            Self::Rr(seq) => C_RR | (seq.bit() << SEQ_SHIFT),
            Self::Rej(seq) => C_REJ | (seq.bit() << SEQ_SHIFT),
        }
    }

    /// Decode a control byte, `None` for values the protocol does not define
    pub fn from_byte(byte: u8) -> Option<Self> {
        let seq = SeqBit::from_bit(byte >> SEQ_SHIFT);
        match byte & !(1 << SEQ_SHIFT) {
            C_I => Some(Self::Info(seq)),
            C_RR => Some(Self::Rr(seq)),
            C_REJ => Some(Self::Rej(seq)),
            // Unnumbered frames never carry the sequence bit
            C_SET if byte == C_SET => Some(Self::Set),
            C_UA if byte == C_UA => Some(Self::Ua),
            C_DISC if byte == C_DISC => Some(Self::Disc),
            _ => None,
        }
    }

    /// Whether this is an information frame
    pub fn is_information(self) -> bool {
        matches!(self, Self::Info(_))
    }

    /// Short mnemonic used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Set => "SET",
            Self::Ua => "UA",
            Self::Disc => "DISC",
            Self::Info(_) => "I",
            Self::Rr(_) => "RR",
            Self::Rej(_) => "REJ",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info(seq) | Self::Rr(seq) | Self::Rej(seq) => {
                write!(f, "{}({})", self.name(), seq)
            }
            _ => write!(f, "{}", self.name()),
        }
    }
}
