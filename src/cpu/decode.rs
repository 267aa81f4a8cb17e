//! Instruction catalogue and decoder.
//!
//! Every word splits into an opcode index (the top O bits) and an address
//! (the low `W - O` bits). The catalogue holds 32 instructions; the 4-bit
//! instruction set can reach the first 16 of them, the 5-bit set all 32.

use crate::word::{Architecture, Word};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;

/// How an instruction uses its address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// Operand is the memory word at the address.
    Addressed,
    /// Operand is the address field itself.
    Immediate,
    /// Address field is ignored.
    None,
}

/// The instruction catalogue, in opcode order.
///
/// The discriminant is the opcode index, so the order is significant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Display, EnumString, EnumIter, EnumCount, IntoStaticStr,
    TryFromPrimitive, IntoPrimitive, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum Opcode {
    // ==================== 4-bit set ====================
    Hlt,
    Lda,
    Sta,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Jmp,
    Jeq,
    Jlt,
    Out,
    Oua,
    Inp,
    Ina,
    Nop,

    // ==================== 5-bit set ====================
    Adds,
    Subs,
    Muls,
    Divs,
    Mods,
    And,
    Or,
    Xor,
    Not,
    Adb,
    Shr,
    Shl,
    Ror,
    Rol,
    Cmp,
    Cmps,
}

// The 5-bit instruction set must fill its opcode space exactly.
const _: () = assert!(Opcode::COUNT == 32);
const _: () = assert!(Opcode::Cmps as usize == Opcode::COUNT - 1);
const _: () = assert!(Opcode::Nop as usize == 15);

impl Opcode {
    /// Opcode index.
    #[inline]
    pub fn index(self) -> u8 {
        self.into()
    }

    /// Upper-case mnemonic.
    #[inline]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// How the instruction reads its address field.
    pub fn target_kind(self) -> TargetKind {
        use Opcode::*;
        match self {
            Hlt | Nop => TargetKind::None,
            Adds | Subs | Muls | Divs | Mods | Not | Shr | Shl | Ror | Rol | Cmps => {
                TargetKind::Immediate
            }
            Lda | Sta | Add | Sub | Mul | Div | Mod | Jmp | Jeq | Jlt | Out | Oua | Inp | Ina
            | And | Or | Xor | Adb | Cmp => TargetKind::Addressed,
        }
    }

    /// One-line description for help panels and listings.
    pub fn description(self) -> &'static str {
        use Opcode::*;
        match self {
            Hlt => "Halt the program",
            Lda => "Load value from address into the accumulator",
            Sta => "Store accumulator value to address",
            Add => "Add value from address to the accumulator",
            Sub => "Subtract value from address from the accumulator",
            Mul => "Multiply value from address into the accumulator",
            Div => "Divide accumulator by value from address",
            Mod => "Modulus accumulator by value from address",
            Jmp => "Jump to address",
            Jeq => "Jump to address if accumulator is zero",
            Jlt => "Jump to address if accumulator is less than zero",
            Out => "Output integer value from address",
            Oua => "Output ASCII value from address",
            Inp => "Input integer value to address (0 = accumulator)",
            Ina => "Input ASCII string to address (0 = accumulator)",
            Nop => "No operation",
            Adds => "Add the address value to the accumulator",
            Subs => "Subtract the address value from the accumulator",
            Muls => "Multiply the address value into the accumulator",
            Divs => "Divide accumulator by the address value",
            Mods => "Modulus accumulator by the address value",
            And => "AND accumulator with value from address",
            Or => "OR accumulator with value from address",
            Xor => "XOR accumulator with value from address",
            Not => "NOT accumulator",
            Adb => "Binary add value from address, trimming extra bits",
            Shr => "Shift accumulator right by the address value",
            Shl => "Shift accumulator left by the address value",
            Ror => "Rotate accumulator right by the address value",
            Rol => "Rotate accumulator left by the address value (not dispatched)",
            Cmp => "Set accumulator to 1 if equal to value from address, else 0",
            Cmps => "Set accumulator to 1 if equal to the address value, else 0",
        }
    }

    /// Whether this opcode is reachable with the given instruction set.
    #[inline]
    pub fn is_available(self, arch: &Architecture) -> bool {
        (self.index() as usize) < arch.opcode_count()
    }
}

/// The instructions valid for an architecture, in opcode order.
pub fn catalogue(arch: &Architecture) -> impl Iterator<Item = Opcode> {
    Opcode::iter().take(arch.opcode_count())
}

/// A decoded instruction: opcode plus raw address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub address: u64,
}

impl Instruction {
    pub fn new(opcode: Opcode, address: u64) -> Self {
        Self { opcode, address }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode.target_kind() {
            TargetKind::None if self.address == 0 => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.address),
        }
    }
}

/// Split a word into `(opcode_index, address)`.
#[inline]
pub fn split(word: Word, arch: &Architecture) -> (u64, u64) {
    (word >> arch.address_width(), word & arch.address_mask())
}

/// Inverse of [`split`] for in-range fields.
#[inline]
pub fn join(opcode_index: u64, address: u64, arch: &Architecture) -> Word {
    (opcode_index << arch.address_width()) | (address & arch.address_mask())
}

/// Resolve an opcode index against the active instruction set.
pub fn lookup(opcode_index: u64, arch: &Architecture) -> Result<Opcode, DecodeError> {
    let invalid = DecodeError::InvalidOpcode {
        index: opcode_index,
        opcode_width: arch.opcode_width(),
    };
    if opcode_index >= arch.opcode_count() as u64 {
        return Err(invalid);
    }
    u8::try_from(opcode_index)
        .ok()
        .and_then(|byte| Opcode::try_from(byte).ok())
        .ok_or(invalid)
}

/// Decode a word.
pub fn decode(word: Word, arch: &Architecture) -> Result<Instruction, DecodeError> {
    let (index, address) = split(word, arch);
    let opcode = lookup(index, arch)?;
    Ok(Instruction { opcode, address })
}

/// Encode an instruction. The address is truncated to the address field.
pub fn encode(instr: Instruction, arch: &Architecture) -> Word {
    join(instr.opcode.index() as u64, instr.address, arch)
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode {index} for the {opcode_width}-bit instruction set")]
    InvalidOpcode { index: u64, opcode_width: u32 },
}
