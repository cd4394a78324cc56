//! Bit-error injection channel
//!
//! Wraps another channel and corrupts bytes on the read path:
//! - with `header_error_probability` per frame, one random bit of the
//!   address/control/BCC1 triplet is flipped;
//! - with `payload_error_probability` per byte, one random bit of a byte
//!   after the header is flipped.
//!
//! Frame boundaries are tracked on the bytes as they arrived from the wrapped
//! channel, before any corruption.

use super::{Channel, ChannelError};
use crate::config::ConfigError;
use crate::core::protocol::TERM;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const HEADER_LEN: usize = 3;

/// Error injection configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitErrorConfig {
    /// Probability (0.0 - 1.0) that a frame gets one header bit flipped
    pub header_error_probability: f64,
    /// Probability (0.0 - 1.0) that a payload byte gets one bit flipped
    pub payload_error_probability: f64,
    /// Seed for reproducible runs; entropy when `None`
    pub seed: Option<u64>,
}

impl Default for BitErrorConfig {
    fn default() -> Self {
        Self {
            header_error_probability: 0.0,
            payload_error_probability: 0.0,
            seed: None,
        }
    }
}

impl BitErrorConfig {
    /// Header error rate of 10% and a frame error rate of roughly 80% for
    /// 1020-byte payloads
    pub fn classic() -> Self {
        Self {
            header_error_probability: 0.1,
            payload_error_probability: 0.8 / 1020.0,
            seed: None,
        }
    }

    /// Set the seed
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Both probabilities must lie in `[0, 1]`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("header_error_probability", self.header_error_probability),
            ("payload_error_probability", self.payload_error_probability),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 1, got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Between frames
    Outside,
    /// Inside the header, index into the triplet
    Header(usize),
    /// After BCC1
    Payload,
}

/// Bit-flipping decorator around a channel
pub struct BitErrorChannel<C> {
    inner: C,
    config: BitErrorConfig,
    rng: StdRng,
    position: Position,
    /// Header byte index and bit chosen for the current frame
    header_hit: Option<(usize, u8)>,
    flipped: u64,
}

impl<C: Channel> BitErrorChannel<C> {
    /// Wrap `inner`, rejecting probabilities outside `[0, 1]`
    pub fn new(inner: C, config: BitErrorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            inner,
            config,
            rng,
            position: Position::Outside,
            header_hit: None,
            flipped: 0,
        })
    }

    /// Number of bits flipped so far
    pub fn flipped(&self) -> u64 {
        self.flipped
    }

    /// Unwrap the inner channel
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn start_frame(&mut self) {
        self.position = Position::Header(0);
        self.header_hit = if self.rng.gen_bool(self.config.header_error_probability) {
            Some((self.rng.gen_range(0..HEADER_LEN), self.rng.gen_range(0..8)))
        } else {
            None
        };
    }

    fn flip(&mut self, byte: u8, bit: u8) -> u8 {
        self.flipped += 1;
        byte ^ (1 << bit)
    }

    fn process(&mut self, byte: u8) -> u8 {
        match (self.position, byte) {
            (Position::Outside, TERM) | (Position::Header(_), TERM) => {
                self.start_frame();
                byte
            }
            (Position::Payload, TERM) => {
                self.position = Position::Outside;
                byte
            }
            (Position::Outside, _) => byte,
            (Position::Header(index), _) => {
                self.position = if index + 1 == HEADER_LEN {
                    Position::Payload
                } else {
                    Position::Header(index + 1)
                };
                let header_hit = self.header_hit;
                match header_hit {
                    Some((hit, bit)) if hit == index => self.flip(byte, bit),
                    _ => byte,
                }
            }
            (Position::Payload, _) => {
                if self.rng.gen_bool(self.config.payload_error_probability) {
                    let bit = self.rng.gen_range(0..8);
                    self.flip(byte, bit)
                } else {
                    byte
                }
            }
        }
    }
}

impl<C: Channel> Channel for BitErrorChannel<C> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.inner.write_all(data)
    }

    fn read_byte(&mut self, deadline: Option<Instant>) -> Result<Option<u8>, ChannelError> {
        Ok(self.inner.read_byte(deadline)?.map(|b| self.process(b)))
    }

    fn describe(&self) -> String {
        format!(
            "{} (bit errors: header {:.3}, payload {:.5})",
            self.inner.describe(),
            self.config.header_error_probability,
            self.config.payload_error_probability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{Control, Frame, SeqBit};
    use crate::core::transport::LoopbackChannel;

    fn pass_through(config: BitErrorConfig, bytes: &[u8]) -> (Vec<u8>, u64) {
        let (mut a, b) = LoopbackChannel::pair();
        let mut noisy = BitErrorChannel::new(b, config).unwrap();
        a.write_all(bytes).unwrap();
        let out = (0..bytes.len())
            .map(|_| noisy.read_byte(None).unwrap().unwrap())
            .collect();
        (out, noisy.flipped())
    }

    #[test]
    fn test_zero_probability_is_transparent() {
        let bytes = Frame::information(SeqBit::Zero, b"transparent").encode();
        let (out, flipped) = pass_through(BitErrorConfig::default().seed(7), &bytes);
        assert_eq!(out, bytes);
        assert_eq!(flipped, 0);
    }

    #[test]
    fn test_header_errors_hit_only_the_triplet() {
        let config = BitErrorConfig {
            header_error_probability: 1.0,
            payload_error_probability: 0.0,
            seed: Some(1),
        };
        let bytes = Frame::information(SeqBit::One, b"payload").encode();
        let (out, flipped) = pass_through(config, &bytes);
        assert_eq!(flipped, 1);
        let diff: Vec<usize> = (0..bytes.len()).filter(|&i| bytes[i] != out[i]).collect();
        assert_eq!(diff.len(), 1);
        assert!((1..=3).contains(&diff[0]));
        assert_eq!((bytes[diff[0]] ^ out[diff[0]]).count_ones(), 1);
    }

    #[test]
    fn test_payload_errors_spare_header_and_terminators() {
        let config = BitErrorConfig {
            header_error_probability: 0.0,
            payload_error_probability: 1.0,
            seed: Some(2),
        };
        let bytes = Frame::information(SeqBit::Zero, b"abc").encode();
        let (out, flipped) = pass_through(config, &bytes);
        assert_eq!(&out[..4], &bytes[..4]);
        assert_eq!(out.last(), Some(&TERM));
        // payload bytes plus BCC2
        assert_eq!(flipped, 4);
    }

    #[test]
    fn test_supervisory_frames_have_no_payload_errors() {
        let config = BitErrorConfig {
            header_error_probability: 0.0,
            payload_error_probability: 1.0,
            seed: Some(3),
        };
        let bytes = Frame::supervisory(Control::Ua).encode();
        let (out, flipped) = pass_through(config, &bytes);
        assert_eq!(out, bytes);
        assert_eq!(flipped, 0);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let config = BitErrorConfig {
            header_error_probability: 0.5,
            payload_error_probability: 0.2,
            seed: Some(99),
        };
        let bytes: Vec<u8> = (0..8)
            .flat_map(|i| Frame::information(SeqBit::Zero, &[i; 32]).encode())
            .collect();
        assert_eq!(pass_through(config, &bytes), pass_through(config, &bytes));
    }

    #[test]
    fn test_probabilities_outside_unit_range_are_rejected() {
        let nan = BitErrorConfig {
            header_error_probability: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan.validate(), Err(ConfigError::Invalid(_))));

        let too_high = BitErrorConfig {
            payload_error_probability: 1.5,
            ..Default::default()
        };
        assert!(matches!(too_high.validate(), Err(ConfigError::Invalid(_))));

        let negative = BitErrorConfig {
            header_error_probability: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        assert!(BitErrorConfig::classic().validate().is_ok());
        assert!(BitErrorConfig { header_error_probability: 1.0, ..Default::default() }
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_config_is_refused_by_constructor() {
        let (_a, b) = LoopbackChannel::pair();
        let config = BitErrorConfig {
            header_error_probability: f64::NAN,
            payload_error_probability: 0.0,
            seed: Some(5),
        };
        assert!(matches!(
            BitErrorChannel::new(b, config),
            Err(ConfigError::Invalid(_))
        ));
    }
}
