//! Frame codec
//!
//! Every frame on the wire has the layout
//!
//! ```text
//! +------+---------+---------+------+-----------------+-------+------+
//! | TERM | ADDRESS | CONTROL | BCC1 | stuffed payload | BCC2' | TERM |
//! +------+---------+---------+------+-----------------+-------+------+
//! ```
//!
//! Supervisory frames carry neither payload nor BCC2 and are always
//! [`SUPERVISORY_LEN`] bytes long. `BCC2` is the XOR of all raw payload bytes
//! and is stuffed like a payload byte.

use super::{bcc1, Control, SeqBit, ADDRESS, ESC, ESC_MASK, SUPERVISORY_LEN, TERM};
use thiserror::Error;

/// Frame decoding errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// BCC1 or BCC2 does not match the received bytes
    #[error("Bad checksum")]
    BadChecksum,

    /// Missing delimiter, unknown control byte, bad escape or stray terminator
    #[error("Framing error")]
    FramingError,

    /// The input ends before the closing terminator
    #[error("Incomplete frame")]
    Incomplete,
}

/// A single link-layer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address byte
    pub address: u8,
    /// Control field
    pub control: Control,
    /// Raw (unstuffed) payload, empty for supervisory frames
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a supervisory frame
    pub fn supervisory(control: Control) -> Self {
        Self {
            address: ADDRESS,
            control,
            payload: Vec::new(),
        }
    }

    /// Create an information frame
    pub fn information(seq: SeqBit, payload: &[u8]) -> Self {
        Self {
            address: ADDRESS,
            control: Control::Info(seq),
            payload: payload.to_vec(),
        }
    }

    /// Serialise this frame
    pub fn encode(&self) -> Vec<u8> {
        encode(self.address, self.control, &self.payload)
    }
}

/// XOR-fold of the raw payload bytes
pub fn bcc2(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc ^ b)
}

fn needs_escape(byte: u8) -> bool {
    byte == TERM || byte == ESC
}

fn push_stuffed(out: &mut Vec<u8>, byte: u8) {
    if needs_escape(byte) {
        out.push(ESC);
        out.push(byte ^ ESC_MASK);
    } else {
        out.push(byte);
    }
}

/// Byte-stuff `data`: TERM and ESC become `ESC, byte ^ 0x20`
pub fn stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    for &byte in data {
        push_stuffed(&mut out, byte);
    }
    out
}

/// Reverse of [`stuff`]
///
/// Fails on an unescaped terminator, a dangling escape, or an escaped value
/// that does not map back to TERM or ESC.
pub fn destuff(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            TERM => return Err(DecodeError::FramingError),
            ESC => {
                let next = iter.next().ok_or(DecodeError::Incomplete)?;
                out.push(unescape(*next)?);
            }
            _ => out.push(byte),
        }
    }
    Ok(out)
}

/// Map the byte following an ESC back to its raw value
pub(crate) fn unescape(byte: u8) -> Result<u8, DecodeError> {
    let raw = byte ^ ESC_MASK;
    if needs_escape(raw) {
        Ok(raw)
    } else {
        Err(DecodeError::FramingError)
    }
}

/// Encode a frame
///
/// The payload is ignored for supervisory control values.
pub fn encode(address: u8, control: Control, payload: &[u8]) -> Vec<u8> {
    let ctrl = control.to_byte();
    if !control.is_information() {
        return vec![TERM, address, ctrl, bcc1(address, ctrl), TERM];
    }

    let mut out = Vec::with_capacity(SUPERVISORY_LEN + payload.len() * 2 + 2);
    out.extend_from_slice(&[TERM, address, ctrl, bcc1(address, ctrl)]);
    for &byte in payload {
        push_stuffed(&mut out, byte);
    }
    push_stuffed(&mut out, bcc2(payload));
    out.push(TERM);
    out
}

/// Decode exactly one frame from `bytes`
///
/// `bytes` must start with a terminator and end with the closing terminator.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() < SUPERVISORY_LEN {
        return match bytes.first() {
            Some(&TERM) | None => Err(DecodeError::Incomplete),
            Some(_) => Err(DecodeError::FramingError),
        };
    }
    if bytes[0] != TERM {
        return Err(DecodeError::FramingError);
    }

    let address = bytes[1];
    let ctrl = bytes[2];
    if bytes[3] != bcc1(address, ctrl) {
        return Err(DecodeError::BadChecksum);
    }
    let control = Control::from_byte(ctrl).ok_or(DecodeError::FramingError)?;

    let body = &bytes[4..];
    if !control.is_information() {
        return match body {
            [TERM] => Ok(Frame {
                address,
                control,
                payload: Vec::new(),
            }),
            _ => Err(DecodeError::FramingError),
        };
    }

    let (&last, stuffed) = body.split_last().ok_or(DecodeError::Incomplete)?;
    if last != TERM {
        return Err(DecodeError::Incomplete);
    }
    let mut data = destuff(stuffed)?;
    let received_bcc2 = data.pop().ok_or(DecodeError::FramingError)?;
    if bcc2(&data) != received_bcc2 {
        return Err(DecodeError::BadChecksum);
    }

    Ok(Frame {
        address,
        control,
        payload: data,
    })
}
