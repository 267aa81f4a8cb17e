//! Blocking scheduler for timed runs.
//!
//! Sleeps between ticks on the calling thread. Another thread (a Ctrl-C
//! handler, say) can end the run through a [`StopHandle`].

use super::execute::{Cpu, CpuError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Shared stop request flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after the current step.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous stop request.
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run at `frequency_hz` until HLT, a fault, or a stop request.
///
/// Returns the number of instructions completed. A fault is returned as
/// the error; the CPU is left halted.
pub fn run_blocking(cpu: &mut Cpu, frequency_hz: u32, stop: &StopHandle) -> Result<u64, CpuError> {
    let start = cpu.cycles;
    cpu.run(frequency_hz)?;

    while let Some(delay) = cpu.tick() {
        if stop.is_stopped() {
            cpu.stop();
            break;
        }
        thread::sleep(delay);
    }

    match cpu.last_error() {
        Some(e) if cpu.is_halted() => Err(e.clone()),
        _ => Ok(cpu.cycles - start),
    }
}
