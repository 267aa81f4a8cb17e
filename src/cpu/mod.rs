//! CPU emulation for the VSML machine.
//!
//! A single-accumulator machine with reconfigurable widths:
//! - W-bit two's-complement words, W from 8 to 64
//! - 2 registers: PC and ACC
//! - 16 or 32 instructions, selected by the top 4 or 5 bits of a word

pub mod decode;
pub mod execute;
pub mod io;
pub mod memory;
pub mod reconfig;
pub mod registers;
pub mod runner;

pub use decode::{DecodeError, Instruction, Opcode, TargetKind};
pub use execute::{Cpu, CpuError, CpuEvent, CpuState, StepOutcome};
pub use io::{BatchFeed, InputFeed, InputProvider, Output, OutputSink, WriteSink};
pub use memory::{Memory, MemoryError};
pub use reconfig::{ConflictResolver, ReconfigError, ReconfigReport, Transform};
pub use registers::Registers;
pub use runner::{run_blocking, StopHandle};
