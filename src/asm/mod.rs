//! Assembler, disassembler and image files for VSML programs.
//!
//! This module provides:
//! - A simple two-pass assembler (text → memory words)
//! - A disassembler (words → readable text) and per-word views
//! - The `.vsml` image format (v2 read/write, v1 read)

pub mod assembler;
pub mod disasm;
pub mod vsml;

pub use assembler::{assemble, assemble_image, parse_word, AssemblerError};
pub use disasm::{disassemble, view, WordView};
pub use vsml::{load_vsml, save_vsml, Snapshot, VsmlError};
