//! Supervisory frame recognizer
//!
//! A byte-at-a-time state machine that spots one of a small set of expected
//! 5-byte supervisory frames in a noisy byte stream without decoding payloads.
//!
//! ```text
//!  Idle ──TERM──▶ TermSeen ──ADDR──▶ AddrSeen ──CTRL──▶ CtrlSeen ──BCC1──▶ BccSeen ──TERM──▶ Done
//!    ▲              │  ▲ TERM           │                  │                  │
//!    └──other───────┘  └────TERM────────┴──────────────────┴──────────────────┘
//! ```
//!
//! Any unexpected byte drops back to `Idle`; a terminator always (re)starts a
//! frame, so repeated terminators before a real frame are harmless.

use super::{bcc1, Control, ADDRESS, TERM};

/// Recognizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizerState {
    /// Waiting for a terminator
    #[default]
    Idle,
    /// Opening terminator seen
    TermSeen,
    /// Address byte seen
    AddrSeen,
    /// One of the expected control bytes seen
    CtrlSeen(Control),
    /// Header checksum validated, waiting for the closing terminator
    BccSeen(Control),
    /// Complete frame recognized
    Done(Control),
}

/// Recognizer for a set of expected supervisory frames
#[derive(Debug, Clone)]
pub struct SupervisoryRecognizer {
    expected: Vec<Control>,
    state: RecognizerState,
}

impl SupervisoryRecognizer {
    /// Create a recognizer awaiting any control value in `expected`
    pub fn new(expected: &[Control]) -> Self {
        Self {
            expected: expected.to_vec(),
            state: RecognizerState::Idle,
        }
    }

    /// Create a recognizer awaiting a single control value
    pub fn awaiting(control: Control) -> Self {
        Self::new(&[control])
    }

    /// Current state
    pub fn state(&self) -> RecognizerState {
        self.state
    }

    /// Return to `Idle`
    pub fn reset(&mut self) {
        self.state = RecognizerState::Idle;
    }

    /// Feed one byte; returns the matched control once a frame completes
    pub fn feed(&mut self, byte: u8) -> Option<Control> {
        use RecognizerState::*;

        self.state = match (self.state, byte) {
            (_, TERM) => match self.state {
                BccSeen(control) => Done(control),
                _ => TermSeen,
            },
            (TermSeen, ADDRESS) => AddrSeen,
            (AddrSeen, ctrl) => match self.match_control(ctrl) {
                Some(control) => CtrlSeen(control),
                None => Idle,
            },
            (CtrlSeen(control), bcc) if bcc == bcc1(ADDRESS, control.to_byte()) => BccSeen(control),
            _ => Idle,
        };

        match self.state {
            Done(control) => {
                // Frames share terminators; the closing one may open the next
                self.state = TermSeen;
                Some(control)
            }
            _ => None,
        }
    }

    fn match_control(&self, byte: u8) -> Option<Control> {
        self.expected.iter().copied().find(|c| c.to_byte() == byte)
    }
}
