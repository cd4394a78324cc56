//! ARQ sender
//!
//! Stop-and-wait write path: one I-frame in flight, retransmitted on timeout
//! and on REJ until the peer answers RR or the retry budget runs out.
//!
//! The retry loop itself ([`exchange`]) is shared with connection setup and
//! teardown, which follow the same transmit/arm/await/retry pattern.

use super::{Control, Frame, SeqBit, SupervisoryRecognizer};
use crate::core::link::{LinkError, LinkStats};
use crate::core::timer::RetryTimer;
use crate::core::transport::{Channel, ChannelError};
use std::time::Instant;

/// What to do with a recognized reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// The exchange is complete
    Accept,
    /// Explicit negative acknowledgement, send again without using a retry
    Retransmit,
}

/// Successful exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Exchange {
    /// Reply that completed the exchange
    pub reply: Control,
    /// Timeouts consumed
    pub retries: u32,
    /// Total transmissions of the frame
    pub attempts: u32,
}

/// Failed exchange
#[derive(Debug)]
pub(crate) enum ExchangeError {
    /// Retry budget exhausted after `attempts` transmissions
    Exhausted { attempts: u32 },
    /// Channel failure
    Channel(ChannelError),
}

impl From<ChannelError> for ExchangeError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

/// Write a complete frame
pub(crate) fn transmit<C: Channel + ?Sized>(
    channel: &mut C,
    frame: &[u8],
) -> Result<(), ChannelError> {
    tracing::trace!("TX {}", hex::encode(frame));
    channel.write_all(frame)
}

/// Feed bytes to `recognizer` until it matches or `deadline` passes
pub(crate) fn await_reply<C: Channel + ?Sized>(
    channel: &mut C,
    recognizer: &mut SupervisoryRecognizer,
    deadline: Option<Instant>,
) -> Result<Option<Control>, ChannelError> {
    recognizer.reset();
    while let Some(byte) = channel.read_byte(deadline)? {
        if let Some(control) = recognizer.feed(byte) {
            return Ok(Some(control));
        }
    }
    Ok(None)
}

/// Transmit `frame` until one of `replies` is accepted by `classify`
///
/// The timer is always disarmed when this returns.
pub(crate) fn exchange<C, F>(
    channel: &mut C,
    timer: &mut RetryTimer,
    stats: &mut LinkStats,
    frame: &[u8],
    replies: &[Control],
    retry_limit: u32,
    classify: F,
) -> Result<Exchange, ExchangeError>
where
    C: Channel + ?Sized,
    F: Fn(Control) -> Verdict,
{
    timer.reset_count();
    let result = run_exchange(channel, timer, stats, frame, replies, retry_limit, classify);
    timer.cancel();
    result
}

fn run_exchange<C, F>(
    channel: &mut C,
    timer: &mut RetryTimer,
    stats: &mut LinkStats,
    frame: &[u8],
    replies: &[Control],
    retry_limit: u32,
    classify: F,
) -> Result<Exchange, ExchangeError>
where
    C: Channel + ?Sized,
    F: Fn(Control) -> Verdict,
{
    let mut recognizer = SupervisoryRecognizer::new(replies);
    transmit(channel, frame)?;
    let mut attempts = 1;

    loop {
        let token = timer.arm();
        match await_reply(channel, &mut recognizer, timer.deadline())? {
            Some(reply) => match classify(reply) {
                Verdict::Accept => {
                    return Ok(Exchange {
                        reply,
                        retries: timer.fired(),
                        attempts,
                    });
                }
                Verdict::Retransmit => {
                    timer.cancel();
                    stats.naks_received += 1;
                    stats.retransmissions += 1;
                    tracing::debug!("Received {}, retransmitting", reply);
                }
            },
            None => {
                if !timer.fire(token) {
                    continue;
                }
                stats.timeouts += 1;
                if timer.fired() > retry_limit {
                    tracing::warn!(
                        "No answer after {} transmissions, giving up",
                        attempts
                    );
                    return Err(ExchangeError::Exhausted { attempts });
                }
                stats.retransmissions += 1;
                tracing::debug!(
                    "Timeout after {:?}, retransmitting (retry {}/{})",
                    timer.timeout(),
                    timer.fired(),
                    retry_limit
                );
            }
        }
        transmit(channel, frame)?;
        attempts += 1;
    }
}

/// Send side of one connection
#[derive(Debug, Clone)]
pub struct ArqSender {
    next_seq: SeqBit,
    retry_limit: u32,
    max_payload: usize,
}

impl ArqSender {
    /// Create a sender starting at sequence bit 0
    pub fn new(retry_limit: u32, max_payload: usize) -> Self {
        Self {
            next_seq: SeqBit::Zero,
            retry_limit,
            max_payload,
        }
    }

    /// Sequence bit of the next I-frame
    pub fn next_seq(&self) -> SeqBit {
        self.next_seq
    }

    /// Deliver `payload` in one I-frame
    ///
    /// Returns the number of timeouts consumed on success.
    pub fn send<C: Channel + ?Sized>(
        &mut self,
        channel: &mut C,
        timer: &mut RetryTimer,
        stats: &mut LinkStats,
        payload: &[u8],
    ) -> Result<u32, LinkError> {
        if payload.len() > self.max_payload {
            return Err(LinkError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        let seq = self.next_seq;
        let frame = Frame::information(seq, payload).encode();
        // Replies name the sequence bit the peer expects next
        let ack = Control::Rr(seq.flip());
        let nack = Control::Rej(seq.flip());

        let classify = move |reply: Control| {
            if reply == ack {
                Verdict::Accept
            } else {
                Verdict::Retransmit
            }
        };

        match exchange(channel, timer, stats, &frame, &[ack, nack], self.retry_limit, classify) {
            Ok(done) => {
                self.next_seq = seq.flip();
                stats.frames_sent += 1;
                stats.bytes_sent += payload.len() as u64;
                tracing::debug!(
                    "I({}) acknowledged after {} transmission(s)",
                    seq,
                    done.attempts
                );
                Ok(done.retries)
            }
            Err(ExchangeError::Exhausted { attempts }) => {
                Err(LinkError::MaxRetriesExceeded { attempts })
            }
            Err(ExchangeError::Channel(err)) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{decode, ADDRESS, TERM};
    use crate::core::transport::MockChannel;
    use mockall::Sequence;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type WriteLog = Arc<Mutex<Vec<Vec<u8>>>>;

    fn reply_bytes(control: Control) -> Vec<u8> {
        Frame::supervisory(control).encode()
    }

    /// Mock that answers every write with the next scripted reply; an empty
    /// reply models silence.
    fn scripted(replies: Vec<Vec<u8>>) -> (MockChannel, WriteLog) {
        let log = WriteLog::default();
        let pending = Arc::new(Mutex::new(VecDeque::<u8>::new()));
        let mut script = VecDeque::from(replies);
        let mut mock = MockChannel::new();

        let (writes, inbox) = (log.clone(), pending.clone());
        mock.expect_write_all().returning(move |data| {
            writes.lock().unwrap().push(data.to_vec());
            if let Some(reply) = script.pop_front() {
                inbox.lock().unwrap().extend(reply);
            }
            Ok(())
        });
        mock.expect_read_byte()
            .returning(move |_| Ok(pending.lock().unwrap().pop_front()));
        (mock, log)
    }

    fn timer() -> RetryTimer {
        RetryTimer::new(Duration::from_millis(5))
    }

    #[test]
    fn test_silent_peer_gets_limit_plus_one_transmissions() {
        let mut mock = MockChannel::new();
        mock.expect_write_all().times(4).returning(|_| Ok(()));
        mock.expect_read_byte().returning(|_| Ok(None));

        let mut sender = ArqSender::new(3, 64);
        let mut timer = timer();
        let mut stats = LinkStats::default();
        let err = sender.send(&mut mock, &mut timer, &mut stats, b"lost").unwrap_err();

        assert!(matches!(err, LinkError::MaxRetriesExceeded { attempts: 4 }));
        assert!(!timer.is_armed());
        assert_eq!(stats.timeouts, 4);
        assert_eq!(sender.next_seq(), SeqBit::Zero);
    }

    #[test]
    fn test_ack_flips_sequence_bit() {
        let (mut mock, log) = scripted(vec![
            reply_bytes(Control::Rr(SeqBit::One)),
            reply_bytes(Control::Rr(SeqBit::Zero)),
            reply_bytes(Control::Rr(SeqBit::One)),
        ]);
        let mut sender = ArqSender::new(3, 64);
        let mut timer = timer();
        let mut stats = LinkStats::default();

        for payload in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            sender.send(&mut mock, &mut timer, &mut stats, payload).unwrap();
        }

        let controls: Vec<Control> = log
            .lock()
            .unwrap()
            .iter()
            .map(|f| decode(f).unwrap().control)
            .collect();
        assert_eq!(
            controls,
            vec![
                Control::Info(SeqBit::Zero),
                Control::Info(SeqBit::One),
                Control::Info(SeqBit::Zero),
            ]
        );
        assert_eq!(stats.frames_sent, 3);
        assert_eq!(stats.bytes_sent, 11);
    }

    #[test]
    fn test_nack_does_not_consume_retries() {
        let mut replies: Vec<Vec<u8>> = (0..5)
            .map(|_| reply_bytes(Control::Rej(SeqBit::One)))
            .collect();
        replies.push(reply_bytes(Control::Rr(SeqBit::One)));
        let (mut mock, log) = scripted(replies);

        let mut sender = ArqSender::new(1, 64);
        let mut stats = LinkStats::default();
        let retries = sender.send(&mut mock, &mut timer(), &mut stats, b"noisy").unwrap();

        assert_eq!(retries, 0);
        assert_eq!(log.lock().unwrap().len(), 6);
        assert_eq!(stats.naks_received, 5);
        assert_eq!(sender.next_seq(), SeqBit::One);
    }

    #[test]
    fn test_timeout_then_ack() {
        let (mut mock, log) = scripted(vec![
            Vec::new(),
            Vec::new(),
            reply_bytes(Control::Rr(SeqBit::One)),
        ]);

        let mut sender = ArqSender::new(3, 64);
        let retries = sender
            .send(&mut mock, &mut timer(), &mut LinkStats::default(), b"x")
            .unwrap();

        assert_eq!(retries, 2);
        let writes = log.lock().unwrap();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|f| f == &writes[0]));
    }

    #[test]
    fn test_ignores_replies_for_other_sequence() {
        let mut reply = reply_bytes(Control::Rr(SeqBit::Zero));
        reply.extend(reply_bytes(Control::Rr(SeqBit::One)));
        let (mut mock, log) = scripted(vec![reply]);

        let mut sender = ArqSender::new(0, 64);
        let retries = sender
            .send(&mut mock, &mut timer(), &mut LinkStats::default(), b"y")
            .unwrap();
        assert_eq!(retries, 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_payload_too_large() {
        let mut mock = MockChannel::new();
        mock.expect_write_all().never();
        let mut sender = ArqSender::new(3, 4);
        let err = sender
            .send(&mut mock, &mut timer(), &mut LinkStats::default(), b"12345")
            .unwrap_err();
        assert!(matches!(err, LinkError::PayloadTooLarge { len: 5, max: 4 }));
    }

    #[test]
    fn test_channel_error_disarms_timer() {
        let mut mock = MockChannel::new();
        let mut seq = Sequence::new();
        mock.expect_write_all()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_read_byte()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ChannelError::Disconnected));

        let mut sender = ArqSender::new(3, 64);
        let mut timer = timer();
        let err = sender
            .send(&mut mock, &mut timer, &mut LinkStats::default(), b"z")
            .unwrap_err();
        assert!(matches!(err, LinkError::Channel(ChannelError::Disconnected)));
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_first_frame_layout() {
        let (mut mock, log) = scripted(vec![reply_bytes(Control::Rr(SeqBit::One))]);
        let mut sender = ArqSender::new(3, 64);
        sender
            .send(&mut mock, &mut timer(), &mut LinkStats::default(), &[0x41])
            .unwrap();
        assert_eq!(log.lock().unwrap()[0], vec![TERM, ADDRESS, 0x00, 0x03, 0x41, 0x41, TERM]);
    }
}
