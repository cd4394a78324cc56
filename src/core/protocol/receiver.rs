//! ARQ receiver
//!
//! Blocking read path. Frames are parsed straight off the channel with inline
//! destuffing and a running XOR over every destuffed byte; the last byte
//! before the closing terminator is BCC2, so a clean frame folds to zero.
//!
//! Replies follow the sequence bit the receiver expects next:
//! - valid I(expected): RR(!expected), payload delivered, expected flips
//! - corrupted I(expected): REJ(!expected), payload dropped
//! - I(!expected), a retransmission whose RR was lost: RR(expected) again,
//!   payload dropped
//!
//! Frames with a broken header and supervisory frames are absorbed. A stray
//! SET means the peer missed our UA, so it is answered with UA again.

use super::frame::unescape;
use super::{bcc1, Control, Frame, SeqBit, ADDRESS, ESC, TERM};
use super::sender::transmit;
use crate::core::link::LinkStats;
use crate::core::transport::{Channel, ChannelError};

/// Faults absorbed by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameFault {
    /// BCC2 mismatch, bad escape or oversized payload
    ChecksumError,
    /// Broken header: unknown control byte or BCC1 mismatch
    ProtocolDesync,
    /// Retransmission of an already delivered frame
    DuplicateFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    TermSeen,
    AddrSeen,
    CtrlSeen(Control),
    /// Supervisory header validated, waiting for TERM
    BccSeen(Control),
    /// Inside an I-frame body
    Data { seq: SeqBit, escaped: bool },
}

/// A complete frame read off the channel
#[derive(Debug, Clone, PartialEq, Eq)]
enum RxEvent {
    Supervisory(Control),
    Info { seq: SeqBit, payload: Option<Vec<u8>> },
}

/// Receive side of one connection
#[derive(Debug, Clone)]
pub struct ArqReceiver {
    expected: SeqBit,
    max_payload: usize,
}

impl ArqReceiver {
    /// Create a receiver expecting sequence bit 0
    pub fn new(max_payload: usize) -> Self {
        Self {
            expected: SeqBit::Zero,
            max_payload,
        }
    }

    /// Sequence bit of the next new I-frame
    pub fn expected_seq(&self) -> SeqBit {
        self.expected
    }

    /// Block until one new payload has been received and acknowledged
    pub fn receive<C: Channel + ?Sized>(
        &mut self,
        channel: &mut C,
        stats: &mut LinkStats,
    ) -> Result<Vec<u8>, ChannelError> {
        loop {
            match self.next_frame(channel, stats)? {
                RxEvent::Supervisory(Control::Set) => {
                    tracing::debug!("Stray SET while open, repeating UA");
                    reply(channel, Control::Ua)?;
                }
                RxEvent::Supervisory(control) => {
                    tracing::trace!("Ignoring {} while receiving", control);
                }
                RxEvent::Info { seq, .. } if seq != self.expected => {
                    note(stats, FrameFault::DuplicateFrame, seq);
                    reply(channel, Control::Rr(self.expected))?;
                }
                RxEvent::Info { seq, payload: None } => {
                    note(stats, FrameFault::ChecksumError, seq);
                    stats.naks_sent += 1;
                    reply(channel, Control::Rej(seq.flip()))?;
                }
                RxEvent::Info {
                    seq,
                    payload: Some(payload),
                } => {
                    reply(channel, Control::Rr(seq.flip()))?;
                    self.expected = seq.flip();
                    stats.frames_received += 1;
                    stats.bytes_received += payload.len() as u64;
                    tracing::debug!("Accepted I({}) with {} bytes", seq, payload.len());
                    return Ok(payload);
                }
            }
        }
    }

    /// Block until the peer sends DISC
    ///
    /// Retransmissions of the last delivered I-frame keep being acknowledged
    /// so a peer that missed our final RR can still get to its teardown. New
    /// I-frames are dropped unanswered.
    pub fn await_disconnect<C: Channel + ?Sized>(
        &mut self,
        channel: &mut C,
        stats: &mut LinkStats,
    ) -> Result<(), ChannelError> {
        loop {
            match self.next_frame(channel, stats)? {
                RxEvent::Supervisory(Control::Disc) => return Ok(()),
                RxEvent::Supervisory(Control::Set) => reply(channel, Control::Ua)?,
                RxEvent::Supervisory(_) => {}
                RxEvent::Info { seq, .. } if seq != self.expected => {
                    note(stats, FrameFault::DuplicateFrame, seq);
                    reply(channel, Control::Rr(self.expected))?;
                }
                RxEvent::Info { seq, .. } => {
                    tracing::debug!("Dropping I({}) received while closing", seq);
                }
            }
        }
    }

    /// Read bytes until one complete frame has been seen
    fn next_frame<C: Channel + ?Sized>(
        &self,
        channel: &mut C,
        stats: &mut LinkStats,
    ) -> Result<RxEvent, ChannelError> {
        // BCC2 travels in the body too
        let limit = self.max_payload + 1;
        let mut state = RxState::Idle;
        let mut body: Vec<u8> = Vec::with_capacity(limit);
        let mut check = 0u8;
        let mut corrupt = false;

        loop {
            let Some(byte) = channel.read_byte(None)? else {
                continue;
            };

            state = match (state, byte) {
                (RxState::Data { seq, escaped }, TERM) => {
                    if escaped || body.pop().is_none() || check != 0 {
                        corrupt = true;
                    }
                    let payload = if corrupt { None } else { Some(body) };
                    return Ok(RxEvent::Info { seq, payload });
                }
                (RxState::BccSeen(control), TERM) => return Ok(RxEvent::Supervisory(control)),
                (_, TERM) => RxState::TermSeen,
                (RxState::TermSeen, ADDRESS) => RxState::AddrSeen,
                (RxState::AddrSeen, ctrl) => match Control::from_byte(ctrl) {
                    Some(control) => RxState::CtrlSeen(control),
                    None => {
                        note(stats, FrameFault::ProtocolDesync, SeqBit::Zero);
                        RxState::Idle
                    }
                },
                (RxState::CtrlSeen(control), bcc) if bcc == bcc1(ADDRESS, control.to_byte()) => {
                    match control {
                        Control::Info(seq) => {
                            body.clear();
                            check = 0;
                            corrupt = false;
                            RxState::Data { seq, escaped: false }
                        }
                        _ => RxState::BccSeen(control),
                    }
                }
                (RxState::CtrlSeen(control), _) => {
                    note(stats, FrameFault::ProtocolDesync, SeqBit::Zero);
                    tracing::trace!("BCC1 mismatch on {}", control);
                    RxState::Idle
                }
                (RxState::Data { seq, escaped: false }, ESC) => {
                    RxState::Data { seq, escaped: true }
                }
                (RxState::Data { seq, escaped }, _) => {
                    let raw = if escaped { unescape(byte).ok() } else { Some(byte) };
                    match raw {
                        Some(raw) if body.len() < limit => {
                            check ^= raw;
                            body.push(raw);
                        }
                        _ => corrupt = true,
                    }
                    RxState::Data { seq, escaped: false }
                }
                _ => RxState::Idle,
            };
        }
    }
}

fn reply<C: Channel + ?Sized>(channel: &mut C, control: Control) -> Result<(), ChannelError> {
    transmit(channel, &Frame::supervisory(control).encode())
}

fn note(stats: &mut LinkStats, fault: FrameFault, seq: SeqBit) {
    match fault {
        FrameFault::ChecksumError => {
            tracing::debug!("Checksum error in I({}), sending REJ", seq);
        }
        FrameFault::ProtocolDesync => {
            stats.header_errors += 1;
            tracing::trace!("Header error, resynchronising");
        }
        FrameFault::DuplicateFrame => {
            stats.duplicates += 1;
            tracing::debug!("Duplicate I({}), repeating RR", seq);
        }
    }
}
