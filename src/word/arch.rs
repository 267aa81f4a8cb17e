//! Machine architecture: word width and opcode width.

use super::arith;
use super::Word;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Narrowest supported word.
pub const MIN_WORD_WIDTH: u32 = 8;
/// Widest supported word.
pub const MAX_WORD_WIDTH: u32 = 64;
/// The two instruction sets: 16 opcodes or 32 opcodes.
pub const OPCODE_WIDTHS: [u32; 2] = [4, 5];

/// Word width W and opcode width O.
///
/// The top O bits of a word select the instruction, the remaining
/// `W - O` bits hold the address. Always satisfies `O < W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawArchitecture", into = "RawArchitecture")]
pub struct Architecture {
    word_width: u32,
    opcode_width: u32,
}

impl Architecture {
    /// 16-bit words with the 4-bit instruction set.
    pub const DEFAULT: Architecture = Architecture {
        word_width: 16,
        opcode_width: 4,
    };

    /// Create an architecture, validating both widths.
    pub fn new(word_width: u32, opcode_width: u32) -> Result<Self, ArchError> {
        if !(MIN_WORD_WIDTH..=MAX_WORD_WIDTH).contains(&word_width) {
            return Err(ArchError::WordWidth(word_width));
        }
        if !OPCODE_WIDTHS.contains(&opcode_width) {
            return Err(ArchError::OpcodeWidth(opcode_width));
        }
        Ok(Self {
            word_width,
            opcode_width,
        })
    }

    /// Word width W in bits.
    #[inline]
    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    /// Opcode width O in bits.
    #[inline]
    pub fn opcode_width(&self) -> u32 {
        self.opcode_width
    }

    /// Address width `W - O` in bits.
    #[inline]
    pub fn address_width(&self) -> u32 {
        self.word_width - self.opcode_width
    }

    /// Mask selecting the address field.
    #[inline]
    pub fn address_mask(&self) -> Word {
        arith::mask(self.address_width())
    }

    /// Mask selecting all W bits.
    #[inline]
    pub fn word_mask(&self) -> Word {
        arith::mask(self.word_width)
    }

    /// Number of opcodes valid in this instruction set (`2^O`).
    #[inline]
    pub fn opcode_count(&self) -> usize {
        1 << self.opcode_width
    }

    /// Largest reachable address.
    pub fn max_address(&self) -> u64 {
        self.address_mask()
    }

    /// Smallest representable signed value, `-2^(W-1)`.
    pub fn min_value(&self) -> i64 {
        arith::min_signed(self.word_width)
    }

    /// Largest representable signed value, `2^(W-1) - 1`.
    pub fn max_value(&self) -> i64 {
        arith::max_signed(self.word_width)
    }

    /// How many ASCII characters fit in one word.
    pub fn ascii_capacity(&self) -> usize {
        (self.word_width / 8) as usize
    }

    /// Same opcode width, different word width.
    pub fn with_word_width(&self, word_width: u32) -> Result<Self, ArchError> {
        Self::new(word_width, self.opcode_width)
    }

    /// Same word width, different opcode width.
    pub fn with_opcode_width(&self, opcode_width: u32) -> Result<Self, ArchError> {
        Self::new(self.word_width, opcode_width)
    }
}

impl Default for Architecture {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit words, {}-bit opcodes", self.word_width, self.opcode_width)
    }
}

/// Unvalidated form used for (de)serialization.
#[derive(Serialize, Deserialize)]
struct RawArchitecture {
    word_width: u32,
    opcode_width: u32,
}

impl TryFrom<RawArchitecture> for Architecture {
    type Error = ArchError;

    fn try_from(raw: RawArchitecture) -> Result<Self, Self::Error> {
        Architecture::new(raw.word_width, raw.opcode_width)
    }
}

impl From<Architecture> for RawArchitecture {
    fn from(arch: Architecture) -> Self {
        RawArchitecture {
            word_width: arch.word_width,
            opcode_width: arch.opcode_width,
        }
    }
}

/// Errors from constructing an [`Architecture`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchError {
    #[error("word width {0} out of range ({MIN_WORD_WIDTH}-{MAX_WORD_WIDTH})")]
    WordWidth(u32),

    #[error("opcode width {0} not supported (expected 4 or 5)")]
    OpcodeWidth(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_architecture() {
        let arch = Architecture::default();
        assert_eq!(arch.word_width(), 16);
        assert_eq!(arch.opcode_width(), 4);
        assert_eq!(arch.address_width(), 12);
        assert_eq!(arch.address_mask(), 0x0FFF);
        assert_eq!(arch.opcode_count(), 16);
    }

    #[test]
    fn test_width_validation() {
        assert_eq!(Architecture::new(7, 4), Err(ArchError::WordWidth(7)));
        assert_eq!(Architecture::new(65, 4), Err(ArchError::WordWidth(65)));
        assert_eq!(Architecture::new(16, 3), Err(ArchError::OpcodeWidth(3)));
        assert!(Architecture::new(8, 5).is_ok());
        assert!(Architecture::new(64, 4).is_ok());
    }

    #[test]
    fn test_ranges() {
        let arch = Architecture::new(8, 4).unwrap();
        assert_eq!(arch.min_value(), -128);
        assert_eq!(arch.max_value(), 127);
        assert_eq!(arch.max_address(), 15);
        assert_eq!(arch.ascii_capacity(), 1);

        let wide = Architecture::new(64, 5).unwrap();
        assert_eq!(wide.min_value(), i64::MIN);
        assert_eq!(wide.max_value(), i64::MAX);
        assert_eq!(wide.word_mask(), u64::MAX);
        assert_eq!(wide.ascii_capacity(), 8);
    }

    #[test]
    fn test_serde_validates() {
        let arch: Architecture =
            serde_json::from_str(r#"{"word_width":32,"opcode_width":5}"#).unwrap();
        assert_eq!(arch, Architecture::new(32, 5).unwrap());

        let bad = serde_json::from_str::<Architecture>(r#"{"word_width":4,"opcode_width":4}"#);
        assert!(bad.is_err());
    }
}
