//! Link connection
//!
//! A [`Connection`] owns its channel, both sequence bits, the retry timer and
//! the statistics of one link. It is created by a successful handshake and
//! consumed by [`Connection::close`], so a live value is always
//! [`LinkState::Open`]. The other states only appear in lifecycle logs.

use crate::config::{ConfigError, LinkConfig, Role};
use crate::core::protocol::{handshake, ArqReceiver, ArqSender};
use crate::core::timer::RetryTimer;
use crate::core::transport::{Channel, ChannelError, SerialChannel};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Link errors surfaced to the caller
#[derive(Error, Debug)]
pub enum LinkError {
    /// No UA answered any SET
    #[error("Connection failed after {attempts} attempts")]
    ConnectFailed {
        /// SET frames transmitted
        attempts: u32,
    },

    /// No DISC answered any DISC
    #[error("Disconnect failed after {attempts} attempts")]
    DisconnectFailed {
        /// DISC frames transmitted
        attempts: u32,
    },

    /// An I-frame was never acknowledged
    #[error("Frame not acknowledged after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Transmissions of the frame
        attempts: u32,
    },

    /// Payload longer than the configured maximum
    #[error("Payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Invalid link configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Underlying channel failure
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Link statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// I-frames acknowledged by the peer
    pub frames_sent: u64,
    /// I-frames delivered to the caller
    pub frames_received: u64,
    /// Payload bytes acknowledged by the peer
    pub bytes_sent: u64,
    /// Payload bytes delivered to the caller
    pub bytes_received: u64,
    /// Frames sent again after a timeout or REJ
    pub retransmissions: u64,
    /// Expired retry timers
    pub timeouts: u64,
    /// REJ frames sent
    pub naks_sent: u64,
    /// REJ frames received
    pub naks_received: u64,
    /// Retransmitted I-frames acknowledged but not delivered again
    pub duplicates: u64,
    /// Frames dropped for a broken header
    pub header_errors: u64,
    /// Retries spent on SET and DISC
    pub handshake_retries: u64,
}

impl fmt::Display for LinkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames sent:        {}", self.frames_sent)?;
        writeln!(f, "Frames received:    {}", self.frames_received)?;
        writeln!(f, "Bytes sent:         {}", self.bytes_sent)?;
        writeln!(f, "Bytes received:     {}", self.bytes_received)?;
        writeln!(f, "Retransmissions:    {}", self.retransmissions)?;
        writeln!(f, "Timeouts:           {}", self.timeouts)?;
        writeln!(f, "REJ sent/received:  {}/{}", self.naks_sent, self.naks_received)?;
        writeln!(f, "Duplicates:         {}", self.duplicates)?;
        writeln!(f, "Header errors:      {}", self.header_errors)?;
        write!(f, "Handshake retries:  {}", self.handshake_retries)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No link
    Closed,
    /// Opening handshake running
    Connecting,
    /// Data transfer allowed
    Open,
    /// Teardown handshake running
    Closing,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Closed => write!(f, "Closed"),
            LinkState::Connecting => write!(f, "Connecting"),
            LinkState::Open => write!(f, "Open"),
            LinkState::Closing => write!(f, "Closing"),
        }
    }
}

/// An established link over an exclusively owned channel
pub struct Connection<C: Channel> {
    role: Role,
    channel: C,
    timer: RetryTimer,
    sender: ArqSender,
    receiver: ArqReceiver,
    retry_limit: u32,
    handshake_retries: u32,
    stats: LinkStats,
}

impl Connection<SerialChannel> {
    /// Open the configured serial port and run the handshake
    pub fn open(config: &LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let channel = SerialChannel::open(&config.port, config.baud_rate)?;
        Self::establish(channel, config)
    }
}

impl<C: Channel> Connection<C> {
    /// Run the handshake over an already open channel
    ///
    /// The channel is dropped if the handshake fails.
    pub fn establish(mut channel: C, config: &LinkConfig) -> Result<Self, LinkError> {
        config.validate()?;

        let mut timer = RetryTimer::new(config.timeout());
        let mut stats = LinkStats::default();
        tracing::info!(
            state = %LinkState::Connecting,
            "Connecting as {} on {}",
            config.role,
            channel.describe()
        );

        let handshake_retries = handshake::connect(
            &mut channel,
            &mut timer,
            config.role,
            config.retry_limit,
            &mut stats,
        )?;

        tracing::info!(
            "Link open as {} after {} handshake retries",
            config.role,
            handshake_retries
        );

        Ok(Self {
            role: config.role,
            channel,
            timer,
            sender: ArqSender::new(config.retry_limit, config.max_payload_size),
            receiver: ArqReceiver::new(config.max_payload_size),
            retry_limit: config.retry_limit,
            handshake_retries,
            stats,
        })
    }

    /// Deliver one payload to the peer
    pub fn send(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.sender
            .send(&mut self.channel, &mut self.timer, &mut self.stats, payload)
            .map(|_| ())
    }

    /// Block until the peer delivers one payload
    pub fn receive(&mut self) -> Result<Vec<u8>, LinkError> {
        Ok(self.receiver.receive(&mut self.channel, &mut self.stats)?)
    }

    /// Run the teardown handshake and release the channel
    pub fn close(mut self) -> Result<LinkStats, LinkError> {
        tracing::info!(
            state = %LinkState::Closing,
            "Closing link as {} on {}",
            self.role,
            self.channel.describe()
        );

        match self.role {
            Role::Initiator => {
                handshake::disconnect(
                    &mut self.channel,
                    &mut self.timer,
                    self.role,
                    self.retry_limit,
                    &mut self.stats,
                )?;
            }
            Role::Responder => {
                self.receiver.await_disconnect(&mut self.channel, &mut self.stats)?;
                handshake::confirm_disconnect(&mut self.channel)?;
            }
        }

        tracing::info!(
            frames_sent = self.stats.frames_sent,
            frames_received = self.stats.frames_received,
            retransmissions = self.stats.retransmissions,
            state = %LinkState::Closed,
            "Link closed"
        );
        Ok(self.stats)
    }

    /// Role this side plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    ///
    /// Always [`LinkState::Open`]: `establish` only returns an open link and
    /// `close` consumes it.
    pub fn state(&self) -> LinkState {
        LinkState::Open
    }

    /// Statistics so far
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Retries consumed by the opening handshake
    pub fn handshake_retries(&self) -> u32 {
        self.handshake_retries
    }

    /// Human-readable description of the underlying channel
    pub fn describe(&self) -> String {
        self.channel.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{decode, Control, Frame, SeqBit};
    use crate::core::transport::MockChannel;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type WriteLog = Arc<Mutex<Vec<Vec<u8>>>>;

    /// Mock that answers writes from a script keyed on what was written
    fn peer<F>(mut respond: F) -> (MockChannel, WriteLog)
    where
        F: FnMut(Control) -> Option<Vec<u8>> + Send + 'static,
    {
        let log = WriteLog::default();
        let inbox = Arc::new(Mutex::new(VecDeque::<u8>::new()));
        let mut mock = MockChannel::new();

        let (writes, queue) = (log.clone(), inbox.clone());
        mock.expect_write_all().returning(move |data| {
            writes.lock().unwrap().push(data.to_vec());
            if let Some(reply) = respond(decode(data).unwrap().control) {
                queue.lock().unwrap().extend(reply);
            }
            Ok(())
        });
        mock.expect_read_byte()
            .returning(move |_| Ok(inbox.lock().unwrap().pop_front()));
        mock.expect_describe().returning(|| "mock".to_string());
        (mock, log)
    }

    /// A well-behaved responder
    fn cooperative(control: Control) -> Option<Vec<u8>> {
        let reply = match control {
            Control::Set => Control::Ua,
            Control::Disc => Control::Disc,
            Control::Info(seq) => Control::Rr(seq.flip()),
            _ => return None,
        };
        Some(Frame::supervisory(reply).encode())
    }

    fn config() -> LinkConfig {
        LinkConfig::default().timeout_ms(5).retry_limit(2)
    }

    #[test]
    fn test_full_lifecycle() {
        let (mock, log) = peer(cooperative);
        let mut link = Connection::establish(mock, &config()).unwrap();
        assert_eq!(link.state(), LinkState::Open);
        assert_eq!(link.role(), Role::Initiator);
        assert_eq!(link.handshake_retries(), 0);

        link.send(b"first").unwrap();
        link.send(b"second").unwrap();
        let stats = link.close().unwrap();

        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_sent, 11);
        let controls: Vec<Control> = log
            .lock()
            .unwrap()
            .iter()
            .map(|f| decode(f).unwrap().control)
            .collect();
        assert_eq!(
            controls,
            vec![
                Control::Set,
                Control::Info(SeqBit::Zero),
                Control::Info(SeqBit::One),
                Control::Disc,
                Control::Ua,
            ]
        );
    }

    #[test]
    fn test_silent_peer_fails_to_connect() {
        let (mock, log) = peer(|_| None);
        let result = Connection::establish(mock, &config());
        assert!(matches!(result, Err(LinkError::ConnectFailed { attempts: 3 })));
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_io() {
        let mut mock = MockChannel::new();
        mock.expect_write_all().never();
        let result = Connection::establish(mock, &LinkConfig::default().max_payload_size(0));
        assert!(matches!(result, Err(LinkError::Config(_))));
    }

    #[test]
    fn test_oversized_payload_is_refused() {
        let (mock, _log) = peer(cooperative);
        let mut link = Connection::establish(mock, &config().max_payload_size(4)).unwrap();
        assert!(matches!(
            link.send(b"too long"),
            Err(LinkError::PayloadTooLarge { len: 8, max: 4 })
        ));
        assert_eq!(link.stats().frames_sent, 0);
    }

    #[test]
    fn test_state_names() {
        let names: Vec<String> = [
            LinkState::Closed,
            LinkState::Connecting,
            LinkState::Open,
            LinkState::Closing,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["Closed", "Connecting", "Open", "Closing"]);
    }

    #[test]
    fn test_stats_display() {
        let stats = LinkStats {
            frames_sent: 3,
            naks_sent: 1,
            naks_received: 2,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Frames sent:        3"));
        assert!(text.contains("REJ sent/received:  1/2"));
    }
}
