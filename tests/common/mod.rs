//! Shared helpers for link integration tests

#![allow(dead_code)]

use seriallink_core::{Channel, ChannelError, Connection, LinkConfig, LinkError, Role};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Every frame written through a channel, in order
pub type WriteLog = Arc<Mutex<Vec<Vec<u8>>>>;

/// Damage applied to one write
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// The frame never reaches the peer
    Drop,
    /// One bit of the frame is inverted in flight
    FlipBit { byte: usize, bit: u8 },
}

/// Channel that damages selected writes, counted from zero
pub struct FaultyChannel<C> {
    inner: C,
    writes: usize,
    faults: HashMap<usize, Fault>,
    log: WriteLog,
}

impl<C: Channel> FaultyChannel<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            writes: 0,
            faults: HashMap::new(),
            log: WriteLog::default(),
        }
    }

    /// Damage the `index`-th write
    pub fn fault(mut self, index: usize, fault: Fault) -> Self {
        self.faults.insert(index, fault);
        self
    }

    /// Handle to the frames written so far, as sent before any damage
    pub fn log(&self) -> WriteLog {
        self.log.clone()
    }
}

impl<C: Channel> Channel for FaultyChannel<C> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let index = self.writes;
        self.writes += 1;
        self.log.lock().unwrap().push(data.to_vec());
        match self.faults.get(&index) {
            Some(Fault::Drop) => Ok(()),
            Some(Fault::FlipBit { byte, bit }) => {
                let mut damaged = data.to_vec();
                damaged[*byte] ^= 1 << bit;
                self.inner.write_all(&damaged)
            }
            None => self.inner.write_all(data),
        }
    }

    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError> {
        self.inner.read_byte(deadline)
    }

    fn describe(&self) -> String {
        format!("faulty {}", self.inner.describe())
    }
}

/// Quick timeouts so retransmission tests stay fast
pub fn fast_config(role: Role) -> LinkConfig {
    LinkConfig::new("loopback", role)
        .timeout_ms(200)
        .retry_limit(5)
        .max_payload_size(256)
}

/// Run a responder in the background that collects payloads until an empty
/// one arrives, then closes
pub fn spawn_responder<C>(
    channel: C,
    config: LinkConfig,
) -> JoinHandle<Result<(Vec<Vec<u8>>, seriallink_core::LinkStats), LinkError>>
where
    C: Channel + 'static,
{
    thread::spawn(move || {
        let mut link = Connection::establish(channel, &config)?;
        let mut payloads = Vec::new();
        loop {
            let payload = link.receive()?;
            if payload.is_empty() {
                break;
            }
            payloads.push(payload);
        }
        let stats = link.close()?;
        Ok((payloads, stats))
    })
}
