//! Machine registers.
//!
//! The machine has two registers:
//! - PC: unsigned program counter, indexes memory
//! - ACC: two's-complement accumulator, always held in the canonical
//!   range of the current word width

use crate::word::arith;
use serde::{Deserialize, Serialize};

/// The register file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// Program counter.
    pub pc: u64,

    /// Accumulator, in `[-2^(W-1), 2^(W-1) - 1]`.
    pub acc: i64,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self { pc: 0, acc: 0 }
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.acc = 0;
    }

    /// Increment the program counter by 1.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u64 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u64) {
        self.pc = addr;
    }

    /// Store any integer into the accumulator, wrapping it into range.
    pub fn set_acc(&mut self, value: i128, width: u32) {
        self.acc = arith::reduce_to_range(value, width);
    }

    /// The accumulator's raw W-bit form.
    pub fn acc_bits(&self, width: u32) -> u64 {
        arith::to_unsigned(self.acc, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_pc() {
        let mut regs = Registers::new();
        regs.pc = 10;

        let old = regs.advance_pc();
        assert_eq!(old, 10);
        assert_eq!(regs.pc, 11);
    }

    #[test]
    fn test_set_acc_wraps() {
        let mut regs = Registers::new();
        regs.set_acc(128, 8);
        assert_eq!(regs.acc, -128);
        assert_eq!(regs.acc_bits(8), 0x80);

        regs.set_acc(-1, 16);
        assert_eq!(regs.acc_bits(16), 0xFFFF);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers { pc: 7, acc: -3 };
        regs.reset();
        assert_eq!(regs, Registers::new());
    }
}
