//! # VSML Emulator
//!
//! An emulator of VSML, a small accumulator machine whose word width
//! (8 to 64 bits) and opcode width (4 or 5 bits) can be changed while a
//! program is loaded. Stored programs are remapped so they keep their
//! meaning across a width change.
//!
//! Words hold two's-complement values; the top O bits of a word select one
//! of 16 or 32 instructions and the remaining bits hold an address.

pub mod asm;
pub mod config;
pub mod cpu;
pub mod word;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use asm::{assemble, disassemble, load_vsml, save_vsml, AssemblerError, Snapshot, VsmlError};
pub use config::{ConfigError, EngineConfig};
pub use cpu::{Cpu, CpuError, CpuEvent, CpuState, Instruction, Memory, Opcode, Registers, StepOutcome};
pub use word::{Architecture, Word};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
