//! Connection setup and teardown
//!
//! One implementation for both roles. The initiator drives every exchange and
//! owns the retry timer; the responder blocks without a deadline and answers.
//!
//! | Phase | Initiator | Responder |
//! |---|---|---|
//! | connect | SET, await UA (retried) | await SET, UA |
//! | disconnect | DISC, await DISC (retried), UA | await DISC, DISC, await UA |

use super::sender::{await_reply, exchange, transmit, ExchangeError, Verdict};
use super::{Control, Frame, SupervisoryRecognizer};
use crate::config::Role;
use crate::core::link::{LinkError, LinkStats};
use crate::core::timer::RetryTimer;
use crate::core::transport::{Channel, ChannelError};

/// Establish the link
///
/// Returns the number of retries the initiator consumed; always 0 for the
/// responder.
pub fn connect<C: Channel + ?Sized>(
    channel: &mut C,
    timer: &mut RetryTimer,
    role: Role,
    retry_limit: u32,
    stats: &mut LinkStats,
) -> Result<u32, LinkError> {
    match role {
        Role::Initiator => {
            let set = Frame::supervisory(Control::Set).encode();
            let done = exchange(channel, timer, stats, &set, &[Control::Ua], retry_limit, |_| {
                Verdict::Accept
            })
            .map_err(|err| match err {
                ExchangeError::Exhausted { attempts } => LinkError::ConnectFailed { attempts },
                ExchangeError::Channel(err) => err.into(),
            })?;
            stats.handshake_retries += u64::from(done.retries);
            tracing::debug!(
                "{} received after {} transmission(s) of SET",
                done.reply,
                done.attempts
            );
            Ok(done.retries)
        }
        Role::Responder => {
            wait_for(channel, Control::Set)?;
            transmit(channel, &Frame::supervisory(Control::Ua).encode())?;
            Ok(0)
        }
    }
}

/// Tear the link down
///
/// Returns the number of retries the initiator consumed; always 0 for the
/// responder.
pub fn disconnect<C: Channel + ?Sized>(
    channel: &mut C,
    timer: &mut RetryTimer,
    role: Role,
    retry_limit: u32,
    stats: &mut LinkStats,
) -> Result<u32, LinkError> {
    match role {
        Role::Initiator => {
            let disc = Frame::supervisory(Control::Disc).encode();
            let done = exchange(channel, timer, stats, &disc, &[Control::Disc], retry_limit, |_| {
                Verdict::Accept
            })
            .map_err(|err| match err {
                ExchangeError::Exhausted { attempts } => LinkError::DisconnectFailed { attempts },
                ExchangeError::Channel(err) => err.into(),
            })?;
            stats.handshake_retries += u64::from(done.retries);
            transmit(channel, &Frame::supervisory(Control::Ua).encode())?;
            Ok(done.retries)
        }
        Role::Responder => {
            wait_for(channel, Control::Disc)?;
            confirm_disconnect(channel)?;
            Ok(0)
        }
    }
}

/// Responder side of teardown once DISC has been received
///
/// Answers DISC and waits for the final UA. A repeated DISC means our answer
/// was lost and is answered again.
pub fn confirm_disconnect<C: Channel + ?Sized>(channel: &mut C) -> Result<(), ChannelError> {
    let disc = Frame::supervisory(Control::Disc).encode();
    let mut recognizer = SupervisoryRecognizer::new(&[Control::Ua, Control::Disc]);
    transmit(channel, &disc)?;
    loop {
        match await_reply(channel, &mut recognizer, None)? {
            Some(Control::Ua) => return Ok(()),
            Some(_) => {
                tracing::debug!("DISC repeated by peer, answering again");
                transmit(channel, &disc)?;
            }
            None => {}
        }
    }
}

fn wait_for<C: Channel + ?Sized>(channel: &mut C, control: Control) -> Result<(), ChannelError> {
    let mut recognizer = SupervisoryRecognizer::awaiting(control);
    tracing::debug!("Waiting for {} on {}", control, channel.describe());
    // Without a deadline a read only returns on a byte or an error
    while await_reply(channel, &mut recognizer, None)?.is_none() {}
    Ok(())
}
