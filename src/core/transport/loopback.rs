//! In-memory loopback channel pair

use super::{Channel, ChannelError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::time::Instant;

/// One end of an in-memory full-duplex byte pipe
///
/// Whatever one end writes, the other end reads. Dropping one end makes the
/// other fail with [`ChannelError::Disconnected`] once its buffered bytes are
/// drained.
pub struct LoopbackChannel {
    label: &'static str,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl LoopbackChannel {
    /// Create a connected pair
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();
        (
            Self {
                label: "loopback-a",
                tx: a_tx,
                rx: a_rx,
                pending: VecDeque::new(),
            },
            Self {
                label: "loopback-b",
                tx: b_tx,
                rx: b_rx,
                pending: VecDeque::new(),
            },
        )
    }
}

impl Channel for LoopbackChannel {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| ChannelError::Disconnected)
    }

    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError> {
        while self.pending.is_empty() {
            let chunk = match deadline {
                Some(deadline) => match self.rx.recv_deadline(deadline) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => return Err(ChannelError::Disconnected),
                },
                None => self.rx.recv().map_err(|_| ChannelError::Disconnected)?,
            };
            self.pending.extend(chunk);
        }
        Ok(self.pending.pop_front())
    }

    fn describe(&self) -> String {
        self.label.to_string()
    }
}
