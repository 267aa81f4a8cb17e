//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle, the run/stop state machine
//! and the host-facing operations (load, save, reconfigure, I/O).

use crate::asm::vsml::{self, Snapshot, VsmlError};
use crate::config::{ConfigError, EngineConfig};
use crate::cpu::decode::{self, DecodeError, Instruction, Opcode, TargetKind};
use crate::cpu::io::{self, InputFeed, InputKind, Output, OutputSink};
use crate::cpu::memory::MemoryError;
use crate::cpu::reconfig::{self, ConflictResolver, ReconfigError, ReconfigReport, Transform};
use crate::cpu::{Memory, Registers};
use crate::word::{arith, Architecture, Word};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default clock rate for timed runs.
pub const DEFAULT_FREQUENCY_HZ: u32 = 4;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Stopped; single steps allowed.
    Idle,
    /// A timed run is in progress.
    Running,
    /// Executed HLT or faulted. Only a reset leaves this state.
    Halted,
}

/// Result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// An instruction completed.
    Continue,
    /// HLT executed.
    Halted,
    /// An input instruction is waiting for the host; it runs again next step.
    AwaitingInput,
}

/// Notifications delivered to a subscribed listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuEvent {
    /// An instruction completed. `pc` is where it was fetched from.
    Stepped {
        pc: u64,
        instruction: Instruction,
        acc: i64,
    },
    /// A line was appended to the output.
    Output(String),
    AwaitingInput(InputKind),
    Halted,
    Fault(CpuError),
    StateChanged(CpuState),
}

/// What the dispatcher asks the step loop to do next.
enum Flow {
    Next,
    Jump,
    Halt,
    Wait(InputKind),
}

type Listener = Box<dyn FnMut(&CpuEvent)>;

/// The VSML CPU.
pub struct Cpu {
    arch: Architecture,
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    state: CpuState,
    frequency_hz: u32,
    input: InputFeed,
    output: Output,
    sink: Option<Box<dyn OutputSink>>,
    listener: Option<Listener>,
    /// Instructions completed since the last reset.
    pub cycles: u64,
    last_instr: Option<Instruction>,
    last_error: Option<CpuError>,
}

impl Cpu {
    /// Create a CPU with the default architecture and zeroed state.
    pub fn new() -> Self {
        Self::with_arch(Architecture::DEFAULT)
    }

    /// Create a CPU for a given architecture.
    pub fn with_arch(arch: Architecture) -> Self {
        Self {
            arch,
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Idle,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            input: InputFeed::default(),
            output: Output::new(),
            sink: None,
            listener: None,
            cycles: 0,
            last_instr: None,
            last_error: None,
        }
    }

    /// Create a CPU from a validated configuration.
    ///
    /// Input starts as an empty batch feed; hosts wanting interactive input
    /// install a provider with [`Cpu::set_input`].
    pub fn with_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let arch = config.validate()?;
        let mut cpu = Self::with_arch(arch);
        cpu.mem = Memory::from_words(vec![0; config.initial_words]);
        cpu.mem.set_limit(config.memory_limit.max(config.initial_words));
        cpu.frequency_hz = config.frequency_hz;
        Ok(cpu)
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn frequency(&self) -> u32 {
        self.frequency_hz
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// The most recent error reported by a step.
    pub fn last_error(&self) -> Option<&CpuError> {
        self.last_error.as_ref()
    }

    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    // ==================== Host wiring ====================

    /// Register a listener for [`CpuEvent`]s, replacing any previous one.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&CpuEvent) + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn set_input(&mut self, input: InputFeed) {
        self.input = input;
    }

    pub fn input_mut(&mut self) -> &mut InputFeed {
        &mut self.input
    }

    /// Forward every output line to `sink` as well as the buffer.
    pub fn set_output_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.sink = Some(sink);
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        self.output.take()
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    // ==================== Execution ====================

    /// Execute a single instruction.
    pub fn try_step(&mut self) -> Result<StepOutcome, CpuError> {
        if self.state == CpuState::Halted {
            self.last_error = Some(CpuError::Halted);
            return Err(CpuError::Halted);
        }

        let pc = self.regs.pc;
        let flow = match self.fetch_and_execute(pc) {
            Ok(flow) => flow,
            Err(e) => {
                self.last_error = Some(e.clone());
                self.emit(CpuEvent::Fault(e.clone()));
                self.set_state(CpuState::Halted);
                return Err(e);
            }
        };

        match flow {
            Flow::Wait(kind) => {
                self.emit(CpuEvent::AwaitingInput(kind));
                Ok(StepOutcome::AwaitingInput)
            }
            Flow::Halt => {
                self.cycles += 1;
                self.emit(CpuEvent::Halted);
                self.set_state(CpuState::Halted);
                Ok(StepOutcome::Halted)
            }
            Flow::Next | Flow::Jump => {
                if let Flow::Next = flow {
                    self.regs.advance_pc();
                }
                self.cycles += 1;
                if let Some(instruction) = self.last_instr {
                    let acc = self.regs.acc;
                    self.emit(CpuEvent::Stepped {
                        pc,
                        instruction,
                        acc,
                    });
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    /// Execute a single instruction, reporting whether execution can go on.
    ///
    /// Returns `false` after HLT or on any error; the error is kept in
    /// [`Cpu::last_error`].
    pub fn step(&mut self) -> bool {
        matches!(
            self.try_step(),
            Ok(StepOutcome::Continue | StepOutcome::AwaitingInput)
        )
    }

    /// Start a timed run. Drive it with [`Cpu::tick`].
    pub fn run(&mut self, frequency_hz: u32) -> Result<(), CpuError> {
        if self.state == CpuState::Halted {
            return Err(CpuError::Halted);
        }
        self.set_frequency(frequency_hz)?;
        self.last_error = None;
        self.set_state(CpuState::Running);
        Ok(())
    }

    /// Perform one scheduled step of a timed run.
    ///
    /// Returns the delay before the next tick, or `None` once the run is over.
    pub fn tick(&mut self) -> Option<Duration> {
        if self.state != CpuState::Running {
            return None;
        }
        self.step();
        (self.state == CpuState::Running).then(|| self.tick_interval())
    }

    /// Interval between timed steps.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.frequency_hz.max(1)))
    }

    /// Stop a timed run after the last completed step.
    pub fn stop(&mut self) {
        if self.state == CpuState::Running {
            self.set_state(CpuState::Idle);
        }
    }

    /// Run untimed until HLT, a fault, a pending input, or `max_steps`.
    ///
    /// Returns the number of instructions completed.
    pub fn run_to_halt(&mut self, max_steps: Option<u64>) -> Result<u64, CpuError> {
        let start = self.cycles;
        while max_steps.map_or(true, |limit| self.cycles - start < limit) {
            match self.try_step()? {
                StepOutcome::Continue => {}
                StepOutcome::Halted | StepOutcome::AwaitingInput => break,
            }
        }
        Ok(self.cycles - start)
    }

    pub fn set_frequency(&mut self, frequency_hz: u32) -> Result<(), CpuError> {
        if frequency_hz == 0 {
            return Err(CpuError::InvalidFrequency);
        }
        self.frequency_hz = frequency_hz;
        Ok(())
    }

    /// Zero PC and ACC and leave the halted state. Memory is kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.cycles = 0;
        self.last_instr = None;
        self.last_error = None;
        self.set_state(CpuState::Idle);
    }

    /// Start over with sixteen zeroed words and an empty output.
    pub fn clear(&mut self) {
        self.mem.clear();
        self.output.clear();
        self.reset();
    }

    /// Append `rows` zeroed words.
    pub fn grow(&mut self, rows: usize) -> Result<(), MemoryError> {
        self.mem.grow(rows)
    }

    /// Overwrite one word, truncated to W bits.
    pub fn set_word(&mut self, index: usize, word: Word) -> Result<(), MemoryError> {
        self.mem.write(index as u64, word & self.arch.word_mask())
    }

    // ==================== Persistence ====================

    /// Capture the machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            arch: self.arch,
            pc: self.regs.pc,
            acc: self.regs.acc,
            memory: self.mem.words().to_vec(),
        }
    }

    /// Replace the machine state. Stops any run; output is kept.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.arch = snapshot.arch;
        self.regs.pc = snapshot.pc;
        self.regs.set_acc(snapshot.acc as i128, self.arch.word_width());
        self.mem.replace(snapshot.memory);
        self.cycles = 0;
        self.last_instr = None;
        self.last_error = None;
        self.set_state(CpuState::Idle);
    }

    /// Load a `.vsml` image. On error the current state is untouched.
    pub fn load(&mut self, text: &str) -> Result<(), VsmlError> {
        let snapshot = vsml::decode(text)?;
        self.restore(snapshot);
        Ok(())
    }

    /// Save the current state as a v2 `.vsml` image.
    pub fn save(&self) -> String {
        vsml::encode(&self.snapshot())
    }

    // ==================== Reconfiguration ====================

    /// Change word and/or opcode width, leaving the `exempt` words untouched.
    pub fn reconfigure(
        &mut self,
        arch: Architecture,
        exempt: &[usize],
    ) -> Result<ReconfigReport, ReconfigError> {
        let mut resolver = |_: &Transform, _: &[usize]| Some(Vec::new());
        self.reconfigure_with(arch, exempt, &mut resolver)
    }

    /// Change word and/or opcode width, asking `resolver` about conflicts.
    ///
    /// Words at the `exempt` indices are never rewritten, whatever the
    /// resolver answers.
    pub fn reconfigure_with<R: ConflictResolver + ?Sized>(
        &mut self,
        arch: Architecture,
        exempt: &[usize],
        resolver: &mut R,
    ) -> Result<ReconfigReport, ReconfigError> {
        if self.state == CpuState::Running {
            return Err(ReconfigError::Busy);
        }
        let (words, report) =
            reconfig::remap_all(self.mem.words(), self.arch, arch, exempt, resolver)?;
        self.mem.replace(words);
        self.arch = arch;
        let acc = self.regs.acc as i128;
        self.regs.set_acc(acc, arch.word_width());
        Ok(report)
    }

    // ==================== Internals ====================

    fn fetch_and_execute(&mut self, pc: u64) -> Result<Flow, CpuError> {
        let word = self.mem.fetch(pc)?;
        let instr = decode::decode(word, &self.arch)?;
        let flow = self.execute(instr)?;
        if !matches!(flow, Flow::Wait(_)) {
            self.last_instr = Some(instr);
        }
        Ok(flow)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<Flow, CpuError> {
        let width = self.arch.word_width();
        let addr = instr.address;
        let target: Word = match instr.opcode.target_kind() {
            TargetKind::Addressed => self.mem.fetch(addr)?,
            TargetKind::Immediate => addr,
            TargetKind::None => 0,
        };
        let acc = self.regs.acc as i128;
        let value = arith::word_value(target, width) as i128;
        let immediate = addr as i128;
        let bits = self.regs.acc_bits(width);

        match instr.opcode {
            // ==================== Data movement ====================
            Opcode::Hlt => return Ok(Flow::Halt),
            Opcode::Nop => {}
            Opcode::Lda => self.regs.set_acc(value, width),
            Opcode::Sta => self.mem.write(addr, bits)?,

            // ==================== Arithmetic ====================
            Opcode::Add => self.regs.set_acc(acc + value, width),
            Opcode::Sub => self.regs.set_acc(acc - value, width),
            Opcode::Mul => self.regs.set_acc(acc * value, width),
            Opcode::Div => self.regs.set_acc(divide(acc, value), width),
            Opcode::Mod => self.regs.set_acc(remainder(acc, value), width),
            Opcode::Adds => self.regs.set_acc(acc + immediate, width),
            Opcode::Subs => self.regs.set_acc(acc - immediate, width),
            Opcode::Muls => self.regs.set_acc(acc * immediate, width),
            Opcode::Divs => self.regs.set_acc(divide(acc, immediate), width),
            Opcode::Mods => self.regs.set_acc(remainder(acc, immediate), width),

            // ==================== Control flow ====================
            Opcode::Jmp => {
                self.regs.jump(addr);
                return Ok(Flow::Jump);
            }
            Opcode::Jeq if self.regs.acc == 0 => {
                self.regs.jump(addr);
                return Ok(Flow::Jump);
            }
            Opcode::Jlt if self.regs.acc < 0 => {
                self.regs.jump(addr);
                return Ok(Flow::Jump);
            }
            Opcode::Jeq | Opcode::Jlt => {}

            // ==================== I/O ====================
            Opcode::Out => self.emit_line(value.to_string()),
            Opcode::Oua => {
                let text = io::unpack_ascii(target & self.arch.word_mask(), width);
                self.emit_line(text);
            }
            Opcode::Inp => match self.input.read_integer(&self.arch) {
                None => return Ok(Flow::Wait(InputKind::Integer)),
                Some(v) if addr == 0 => self.regs.acc = v,
                Some(v) => self.mem.write(addr, arith::to_unsigned(v, width))?,
            },
            Opcode::Ina => match self.input.read_ascii(&self.arch) {
                None => return Ok(Flow::Wait(InputKind::Ascii)),
                Some(w) if addr == 0 => self.regs.acc = arith::word_value(w, width),
                Some(w) => self.mem.write(addr, w)?,
            },

            // ==================== Bitwise ====================
            Opcode::And => self.regs.acc = arith::word_value(bits & target, width),
            Opcode::Or => self.regs.acc = arith::word_value(bits | target, width),
            Opcode::Xor => self.regs.acc = arith::word_value(bits ^ target, width),
            Opcode::Not => self.regs.acc = arith::word_value(arith::complement(bits, width), width),
            Opcode::Adb => {
                self.regs.acc = arith::word_value(arith::add_binary(bits, target, width), width)
            }
            Opcode::Shr => {
                self.regs.acc = arith::word_value(arith::shift_right(bits, addr, width), width)
            }
            Opcode::Shl => {
                self.regs.acc = arith::word_value(arith::shift_left(bits, addr, width), width)
            }
            Opcode::Ror => {
                self.regs.acc = arith::word_value(arith::rotate_right(bits, addr, width), width)
            }
            Opcode::Rol => {}

            // ==================== Compare ====================
            Opcode::Cmp => self.regs.acc = i64::from(acc == value),
            Opcode::Cmps => self.regs.acc = i64::from(acc == immediate),
        }

        Ok(Flow::Next)
    }

    fn emit_line(&mut self, text: String) {
        self.output.append_line(&text);
        if let Some(sink) = self.sink.as_mut() {
            sink.append_line(&text);
        }
        self.emit(CpuEvent::Output(text));
    }

    fn emit(&mut self, event: CpuEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }

    fn set_state(&mut self, state: CpuState) {
        if self.state != state {
            self.state = state;
            self.emit(CpuEvent::StateChanged(state));
        }
    }
}

/// Truncating division; a zero divisor yields 0.
fn divide(dividend: i128, divisor: i128) -> i128 {
    if divisor == 0 {
        0
    } else {
        dividend / divisor
    }
}

/// Remainder with the dividend's sign; a zero divisor yields 0.
fn remainder(dividend: i128, divisor: i128) -> i128 {
    if divisor == 0 {
        0
    } else {
        dividend % divisor
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("arch", &self.arch)
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .field("input", &self.input)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU is halted; reset to continue")]
    Halted,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("frequency must be at least 1 Hz")]
    InvalidFrequency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::io::{BatchFeed, InputProvider};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn arch(w: u32, o: u32) -> Architecture {
        Architecture::new(w, o).unwrap()
    }

    fn make_cpu(arch: Architecture, program: &[(Opcode, u64)]) -> Cpu {
        let mut cpu = Cpu::with_arch(arch);
        for (i, &(op, addr)) in program.iter().enumerate() {
            cpu.set_word(i, encode(Instruction::new(op, addr), &arch)).unwrap();
        }
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Hlt, 0)]);
        assert!(!cpu.step());
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0);
        assert_eq!(cpu.try_step(), Err(CpuError::Halted));

        cpu.reset();
        assert_eq!(cpu.state(), CpuState::Idle);
        assert!(!cpu.step());
    }

    #[test]
    fn test_cpu_nop_then_halt() {
        let mut cpu = make_cpu(
            Architecture::DEFAULT,
            &[(Opcode::Nop, 0), (Opcode::Nop, 0), (Opcode::Hlt, 0)],
        );
        assert_eq!(cpu.run_to_halt(None).unwrap(), 3);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_add_wraps_at_word_width() {
        let a = arch(8, 4);
        let mut cpu = make_cpu(a, &[(Opcode::Add, 5)]);
        cpu.set_word(5, 1).unwrap();
        cpu.regs.acc = 127;
        assert!(cpu.step());
        assert_eq!(cpu.regs.acc, -128);
        assert_eq!(cpu.regs.pc, 1);
    }

    #[test]
    fn test_load_store_arithmetic() {
        let mut cpu = make_cpu(
            Architecture::DEFAULT,
            &[
                (Opcode::Lda, 10),
                (Opcode::Mul, 11),
                (Opcode::Sub, 12),
                (Opcode::Sta, 13),
                (Opcode::Hlt, 0),
            ],
        );
        cpu.set_word(10, 7).unwrap();
        cpu.set_word(11, 6).unwrap();
        cpu.set_word(12, arith::to_unsigned(-8, 16)).unwrap();
        cpu.run_to_halt(None).unwrap();
        assert_eq!(cpu.regs.acc, 50);
        assert_eq!(cpu.mem.read(13), 50);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Div, 10), (Opcode::Hlt, 0)]);
        cpu.set_word(10, 2).unwrap();
        cpu.regs.acc = -7;
        cpu.step();
        assert_eq!(cpu.regs.acc, -3);

        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Mod, 10)]);
        cpu.set_word(10, 2).unwrap();
        cpu.regs.acc = -7;
        cpu.step();
        assert_eq!(cpu.regs.acc, -1);
    }

    #[test]
    fn test_divide_by_zero_yields_zero() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Div, 10), (Opcode::Mod, 10)]);
        cpu.regs.acc = 99;
        assert!(cpu.step());
        assert_eq!(cpu.regs.acc, 0);
        cpu.regs.acc = 99;
        assert!(cpu.step());
        assert_eq!(cpu.regs.acc, 0);
        assert!(!cpu.is_halted());
    }

    #[test]
    fn test_jumps() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Jmp, 5)]);
        assert!(cpu.step());
        assert_eq!(cpu.regs.pc, 5);

        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Jeq, 9), (Opcode::Jlt, 9)]);
        cpu.regs.acc = 1;
        cpu.step();
        assert_eq!(cpu.regs.pc, 1);
        cpu.regs.acc = -1;
        cpu.step();
        assert_eq!(cpu.regs.pc, 9);
    }

    #[test]
    fn test_memory_auto_extends() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Lda, 40)]);
        assert!(cpu.step());
        assert_eq!(cpu.mem.len(), 41);

        // Running off the end fetches zero words: HLT.
        let mut cpu = make_cpu(Architecture::DEFAULT, &[]);
        cpu.regs.pc = 20;
        assert!(!cpu.step());
        assert_eq!(cpu.mem.len(), 21);
    }

    #[test]
    fn test_memory_limit_faults() {
        let mut config = EngineConfig::default();
        config.memory_limit = 32;
        let mut cpu = Cpu::with_config(&config).unwrap();
        cpu.set_word(0, encode(Instruction::new(Opcode::Lda, 100), &cpu.arch())).unwrap();
        assert!(!cpu.step());
        assert!(cpu.is_halted());
        assert!(matches!(cpu.last_error(), Some(CpuError::Memory(_))));
    }

    #[test]
    fn test_invalid_opcode_halts() {
        let mut cpu = Cpu::new();
        // A word wider than W whose opcode field reads 16 under O = 4.
        cpu.mem.write(0, 0x1_0000).unwrap();
        assert_eq!(
            cpu.try_step(),
            Err(CpuError::Decode(DecodeError::InvalidOpcode {
                index: 16,
                opcode_width: 4
            }))
        );
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_output_instructions() {
        let a = arch(16, 4);
        let mut cpu = make_cpu(a, &[(Opcode::Out, 10), (Opcode::Oua, 11), (Opcode::Oua, 12)]);
        cpu.set_word(10, arith::to_unsigned(-5, 16)).unwrap();
        cpu.set_word(11, io::pack_ascii(*b"Hi")).unwrap();
        cpu.set_word(12, 0x0041).unwrap();
        cpu.run_to_halt(Some(3)).unwrap();
        assert_eq!(cpu.output().as_str(), "-5\nHi\nA\n");
        assert_eq!(cpu.take_output(), "-5\nHi\nA\n");
        assert!(cpu.output().is_empty());
    }

    #[test]
    fn test_batch_input() {
        let mut cpu = make_cpu(
            Architecture::DEFAULT,
            &[(Opcode::Inp, 0), (Opcode::Inp, 10), (Opcode::Ina, 11)],
        );
        cpu.set_input(InputFeed::Batch(BatchFeed::new("-3\n70000\nOK")));
        cpu.run_to_halt(Some(3)).unwrap();
        assert_eq!(cpu.regs.acc, -3);
        assert_eq!(cpu.mem.read(10), 70000 % 65536);
        assert_eq!(cpu.mem.read(11), io::pack_ascii(*b"OK"));
    }

    struct Pending(Rc<RefCell<Option<i128>>>);

    impl InputProvider for Pending {
        fn request_integer(&mut self, _min: i64, _max: i64, _retry: bool) -> Option<i128> {
            self.0.borrow_mut().take()
        }

        fn request_ascii(&mut self, _max_len: usize, _retry: bool) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_input_suspends_and_resumes() {
        let slot = Rc::new(RefCell::new(None));
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Inp, 0), (Opcode::Hlt, 0)]);
        cpu.set_input(InputFeed::Interactive(Box::new(Pending(slot.clone()))));

        assert_eq!(cpu.try_step(), Ok(StepOutcome::AwaitingInput));
        assert_eq!(cpu.regs.pc, 0);
        assert_eq!(cpu.cycles, 0);

        *slot.borrow_mut() = Some(42);
        assert_eq!(cpu.try_step(), Ok(StepOutcome::Continue));
        assert_eq!(cpu.regs.acc, 42);
        assert_eq!(cpu.regs.pc, 1);
    }

    #[test]
    fn test_bitwise_instructions() {
        let a = arch(8, 5);
        let mut cpu = make_cpu(
            a,
            &[
                (Opcode::Not, 0),
                (Opcode::And, 6),
                (Opcode::Shl, 1),
                (Opcode::Ror, 3),
                (Opcode::Rol, 3),
            ],
        );
        cpu.set_word(6, 0b0000_1111).unwrap();
        cpu.regs.acc = 0b0101_0101;

        cpu.step();
        assert_eq!(cpu.regs.acc_bits(8), 0b1010_1010);
        cpu.step();
        assert_eq!(cpu.regs.acc_bits(8), 0b0000_1010);
        cpu.step();
        assert_eq!(cpu.regs.acc_bits(8), 0b0001_0100);
        cpu.step();
        assert_eq!(cpu.regs.acc_bits(8), 0b1000_0010);
        assert_eq!(cpu.regs.acc, -126);
        cpu.step();
        assert_eq!(cpu.regs.acc_bits(8), 0b1000_0010);
    }

    #[test]
    fn test_adb_and_compare() {
        let a = arch(8, 5);
        let mut cpu = make_cpu(a, &[(Opcode::Adb, 7), (Opcode::Cmps, 3), (Opcode::Cmp, 6)]);
        cpu.set_word(6, 1).unwrap();
        cpu.set_word(7, 0xFF).unwrap();
        cpu.regs.acc = 4;

        cpu.step();
        assert_eq!(cpu.regs.acc, 3);
        cpu.step();
        assert_eq!(cpu.regs.acc, 1);
        cpu.step();
        assert_eq!(cpu.regs.acc, 1);
    }

    #[test]
    fn test_immediate_arithmetic() {
        let a = arch(16, 5);
        let mut cpu = make_cpu(
            a,
            &[(Opcode::Adds, 10), (Opcode::Muls, 3), (Opcode::Subs, 5), (Opcode::Divs, 0)],
        );
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.acc, 25);
        cpu.step();
        assert_eq!(cpu.regs.acc, 0);
    }

    #[test]
    fn test_timed_run() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Nop, 0), (Opcode::Hlt, 0)]);
        assert_eq!(cpu.run(0), Err(CpuError::InvalidFrequency));
        cpu.run(10).unwrap();
        assert!(cpu.is_running());
        assert_eq!(cpu.tick(), Some(Duration::from_millis(100)));
        assert_eq!(cpu.tick(), None);
        assert!(cpu.is_halted());
        assert_eq!(cpu.run(10), Err(CpuError::Halted));
    }

    #[test]
    fn test_stop_keeps_state() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Jmp, 0)]);
        cpu.run(4).unwrap();
        cpu.tick();
        cpu.stop();
        assert_eq!(cpu.state(), CpuState::Idle);
        assert_eq!(cpu.tick(), None);
        assert_eq!(cpu.cycles, 1);
    }

    #[test]
    fn test_events() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Out, 5), (Opcode::Hlt, 0)]);
        cpu.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        cpu.run_to_halt(None).unwrap();

        let events = events.borrow();
        assert_eq!(events[0], CpuEvent::Output("0".into()));
        assert!(matches!(events[1], CpuEvent::Stepped { pc: 0, .. }));
        assert_eq!(events[2], CpuEvent::Halted);
        assert_eq!(events[3], CpuEvent::StateChanged(CpuState::Halted));
    }

    #[test]
    fn test_clear_and_grow() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Out, 0)]);
        cpu.step();
        cpu.grow(4).unwrap();
        assert_eq!(cpu.mem.len(), 20);

        cpu.clear();
        assert_eq!(cpu.mem.len(), 16);
        assert_eq!(cpu.regs, Registers::new());
        assert!(cpu.output().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut cpu = make_cpu(arch(12, 5), &[(Opcode::Lda, 3), (Opcode::Hlt, 0)]);
        cpu.regs.acc = -9;
        cpu.regs.pc = 1;
        let text = cpu.save();

        let mut other = Cpu::new();
        other.load(&text).unwrap();
        assert_eq!(other.snapshot(), cpu.snapshot());
    }

    #[test]
    fn test_failed_load_leaves_state() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Lda, 3)]);
        let before = cpu.snapshot();
        assert!(cpu.load("v2;4,16,0,0\n0000000000000002").is_err());
        assert_eq!(cpu.snapshot(), before);
    }

    #[test]
    fn test_reconfigure_keeps_program() {
        let mut cpu = make_cpu(
            Architecture::DEFAULT,
            &[(Opcode::Lda, 10), (Opcode::Add, 11), (Opcode::Out, 12), (Opcode::Hlt, 0)],
        );
        let report = cpu.reconfigure(arch(32, 4), &[]).unwrap();
        assert_eq!(report.remapped, 3);
        assert_eq!(cpu.arch(), arch(32, 4));
        assert_eq!(
            decode::decode(cpu.mem.read(1), &cpu.arch()).unwrap(),
            Instruction::new(Opcode::Add, 11)
        );
    }

    #[test]
    fn test_reconfigure_exempt_on_opcode_narrow() {
        let mut cpu = Cpu::with_arch(arch(16, 5));
        cpu.set_word(0, 0x0803).unwrap();
        cpu.set_word(1, 0x0803).unwrap();
        let report = cpu.reconfigure(arch(16, 4), &[0]).unwrap();
        assert_eq!(cpu.mem.read(0), 0x0803);
        assert_eq!(cpu.mem.read(1), 0x1003);
        assert_eq!(report.exempted, 1);
    }

    #[test]
    fn test_reconfigure_exempt_on_opcode_widen() {
        let mut cpu = Cpu::with_arch(arch(16, 4));
        cpu.set_word(0, 0x1003).unwrap();
        cpu.set_word(1, 0x1003).unwrap();
        cpu.reconfigure(arch(16, 5), &[0]).unwrap();
        assert_eq!(cpu.mem.read(0), 0x1003);
        assert_eq!(cpu.mem.read(1), 0x0803);
    }

    #[test]
    fn test_reconfigure_rewraps_accumulator() {
        let mut cpu = Cpu::new();
        cpu.regs.acc = 300;
        cpu.reconfigure(arch(8, 4), &[]).unwrap();
        assert_eq!(cpu.regs.acc, 44);
    }

    #[test]
    fn test_reconfigure_while_running_is_busy() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Jmp, 0)]);
        cpu.run(4).unwrap();
        assert_eq!(cpu.reconfigure(arch(32, 4), &[]), Err(ReconfigError::Busy));
    }

    #[test]
    fn test_reconfigure_cancel_leaves_memory() {
        let mut cpu = make_cpu(Architecture::DEFAULT, &[(Opcode::Lda, 10)]);
        let before = cpu.snapshot();
        let mut cancel = |_: &Transform, _: &[usize]| -> Option<Vec<usize>> { None };
        assert_eq!(
            cpu.reconfigure_with(arch(24, 4), &[], &mut cancel),
            Err(ReconfigError::Aborted)
        );
        assert_eq!(cpu.snapshot(), before);
    }
}
