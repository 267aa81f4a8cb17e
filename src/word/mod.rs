//! Word-level primitives.
//!
//! This module provides the machine's data model:
//! - [`Architecture`] - word width W (8..=64) and opcode width O (4 or 5)
//! - [`Word`] - a W-bit unsigned storage cell
//! - [`arith`] - two's-complement conversion, range reduction and bit operations

mod arch;
pub mod arith;

pub use arch::{ArchError, Architecture, MAX_WORD_WIDTH, MIN_WORD_WIDTH, OPCODE_WIDTHS};
pub use arith::{reduce_to_range, to_signed, to_unsigned, word_value};

/// A single memory cell. Only the low W bits are meaningful.
pub type Word = u64;
