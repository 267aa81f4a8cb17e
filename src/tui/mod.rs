//! TUI debugger for the VSML emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Memory view showing bits, instruction, hex and decimal for every word
//! - Step/run/breakpoint controls with adjustable speed
//! - Prompts for program input, cell editing and width changes
//! - Program output panel

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp, Mode};
