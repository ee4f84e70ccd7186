//! Register word decoding.
//!
//! A [`decode`] call turns the raw 16-bit words read from a device register
//! into an engineering value: reconstruct an integer according to the
//! declared [`Encoding`], then divide by the configured scale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding raw register words.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The number of words handed in does not match what the encoding needs.
    ///
    /// This indicates a register spec whose `words` count disagrees with its
    /// encoding, not a transport-level failure.
    #[error("encoding {encoding:?} needs {expected} word(s), got {got}")]
    WordCount {
        encoding: Encoding,
        expected: usize,
        got: usize,
    },
}

/// How raw register words map to an integer before scaling.
///
/// The quirk variants model observed device behavior rather than documented
/// semantics and carry their threshold explicitly so the heuristic is visible
/// in configuration and testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Unsigned 16-bit integer, one word.
    U16,
    /// Signed 16-bit integer (two's complement), one word.
    S16,
    /// Unsigned 32-bit integer, two words, high word first.
    U32,
    /// Signed 32-bit integer (two's complement), two words, high word first.
    S32,
    /// Signed 32-bit integer with swapped word order (low word first).
    S32Swapped,
    /// Unsigned 16-bit value where anything above the threshold means
    /// "invalid" and is forced to zero.
    ClampedUnsigned(u16),
    /// Unsigned 16-bit value where the device encodes small negative
    /// magnitudes as values near the 16-bit ceiling: above the threshold the
    /// value becomes `(65535 - raw) * -1`.
    WraparoundSigned(u16),
}

impl Encoding {
    /// Number of 16-bit words this encoding consumes.
    pub fn word_count(&self) -> usize {
        match self {
            Encoding::U16
            | Encoding::S16
            | Encoding::ClampedUnsigned(_)
            | Encoding::WraparoundSigned(_) => 1,
            Encoding::U32 | Encoding::S32 | Encoding::S32Swapped => 2,
        }
    }
}

/// Decode raw register words into a scaled engineering value.
///
/// Pure: no I/O, identical inputs always produce identical output. The word
/// count must match [`Encoding::word_count`]; `scale` is a divisor and must
/// be positive (enforced at configuration load).
pub fn decode(words: &[u16], encoding: Encoding, scale: f64) -> Result<f64, DecodeError> {
    let expected = encoding.word_count();
    if words.len() != expected {
        return Err(DecodeError::WordCount {
            encoding,
            expected,
            got: words.len(),
        });
    }

    let raw = match encoding {
        Encoding::U16 => f64::from(words[0]),
        Encoding::S16 => f64::from(words[0] as i16),
        Encoding::U32 => f64::from((u32::from(words[0]) << 16) | u32::from(words[1])),
        Encoding::S32 => f64::from(((u32::from(words[0]) << 16) | u32::from(words[1])) as i32),
        Encoding::S32Swapped => {
            f64::from(((u32::from(words[1]) << 16) | u32::from(words[0])) as i32)
        }
        Encoding::ClampedUnsigned(threshold) => {
            if words[0] > threshold {
                0.0
            } else {
                f64::from(words[0])
            }
        }
        Encoding::WraparoundSigned(threshold) => {
            if words[0] > threshold {
                -f64::from(65535 - words[0])
            } else {
                f64::from(words[0])
            }
        }
    };

    Ok(raw / scale)
}
