//! Debugger application state and logic.

use crate::asm::assembler::parse_word;
use crate::asm::disasm::disassemble_word;
use crate::cpu::io::{self, InputFeed, InputKind, InputProvider};
use crate::cpu::reconfig::{parse_exempt_list, Transform};
use crate::cpu::{Cpu, CpuEvent};
use crate::word::Architecture;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// What keystrokes currently edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// Answering an `INP`/`INA` prompt.
    Input(InputKind),
    /// Typing a new value for the selected cell.
    Edit,
    /// Typing `W,O` or `W,O;exempt,list`.
    Resize,
}

/// Answer slot shared between the UI and the input provider.
///
/// `retry` stays set from a rejected answer until the next answer is taken.
#[derive(Debug, Default)]
struct Prompt {
    answer: Option<String>,
    retry: bool,
}

/// Input provider fed by the prompt line.
struct PromptProvider(Rc<RefCell<Prompt>>);

impl InputProvider for PromptProvider {
    fn request_integer(&mut self, _min: i64, _max: i64, _retry: bool) -> Option<i128> {
        let mut prompt = self.0.borrow_mut();
        let text = prompt.answer.take()?;
        let value = io::parse_integer(&text, 64);
        prompt.retry = value.is_none();
        value.map(i128::from)
    }

    fn request_ascii(&mut self, _max_len: usize, retry: bool) -> Option<String> {
        let mut prompt = self.0.borrow_mut();
        if retry {
            prompt.retry = true;
        }
        let answer = prompt.answer.take();
        if answer.is_some() {
            prompt.retry = false;
        }
        answer
    }
}

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Where `w` saves the image.
    pub path: Option<PathBuf>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u64>,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    pub mode: Mode,
    /// Text being typed in a non-normal mode.
    pub line: String,
    /// Selected memory address.
    pub selected: usize,
    /// When the next timed step is due.
    next_tick: Option<Instant>,
    /// Lets a run resume from the breakpoint it stopped at.
    skip_breakpoint: bool,
    prompt: Rc<RefCell<Prompt>>,
    events: Rc<RefCell<VecDeque<CpuEvent>>>,
}

impl DebuggerApp {
    /// Create a new debugger around a loaded CPU.
    pub fn new(mut cpu: Cpu, path: Option<PathBuf>) -> Self {
        let prompt = Rc::new(RefCell::new(Prompt::default()));
        cpu.set_input(InputFeed::Interactive(Box::new(PromptProvider(prompt.clone()))));

        let events = Rc::new(RefCell::new(VecDeque::new()));
        let queue = events.clone();
        cpu.subscribe(move |event| queue.borrow_mut().push_back(event.clone()));

        Self {
            cpu,
            path,
            breakpoints: HashSet::new(),
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mode: Mode::Normal,
            line: String::new(),
            selected: 0,
            next_tick: None,
            skip_breakpoint: false,
            prompt,
            events,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if self.cpu.is_halted() {
            self.status = "CPU halted. Press 'x' to reset.".into();
            return;
        }
        self.cpu.step();
        self.drain_events();
    }

    /// Start or stop a timed run.
    pub fn toggle_run(&mut self) {
        if self.cpu.is_running() {
            self.cpu.stop();
            self.next_tick = None;
            self.status = "Stopped.".into();
            return;
        }
        match self.cpu.run(self.cpu.frequency()) {
            Ok(()) => {
                self.status = format!("Running at {} Hz...", self.cpu.frequency());
                self.next_tick = Some(Instant::now());
                self.skip_breakpoint = true;
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
    }

    /// Run one scheduled step if it is due.
    pub fn tick(&mut self, now: Instant) {
        let Some(due) = self.next_tick else {
            return;
        };
        if now < due || self.mode != Mode::Normal {
            return;
        }

        let skip = std::mem::take(&mut self.skip_breakpoint);
        if !skip && self.breakpoints.contains(&self.cpu.regs.pc) {
            self.cpu.stop();
            self.next_tick = None;
            self.status = format!("Breakpoint at PC={}", self.cpu.regs.pc);
            return;
        }

        self.next_tick = self.cpu.tick().map(|delay| now + delay);
        self.drain_events();
    }

    /// Time until the next scheduled step, capped for UI polling.
    pub fn poll_timeout(&self, now: Instant) -> Duration {
        let cap = Duration::from_millis(50);
        self.next_tick
            .map_or(cap, |due| due.saturating_duration_since(now).min(cap))
    }

    /// Change the run frequency by `delta` Hz.
    pub fn adjust_frequency(&mut self, delta: i64) {
        let hz = (i64::from(self.cpu.frequency()) + delta).clamp(1, 1000) as u32;
        if self.cpu.set_frequency(hz).is_ok() {
            self.status = format!("Speed: {} Hz", hz);
        }
    }

    /// Toggle breakpoint at the selected address.
    pub fn toggle_breakpoint(&mut self) {
        let addr = self.selected as u64;
        if self.breakpoints.remove(&addr) {
            self.status = format!("Removed breakpoint at {}", addr);
        } else {
            self.breakpoints.insert(addr);
            self.status = format!("Set breakpoint at {}", addr);
        }
    }

    /// Zero PC and ACC.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.next_tick = None;
        self.mode = Mode::Normal;
        self.drain_events();
        self.status = "Reset. Ready.".into();
    }

    /// Start over with an empty machine.
    pub fn new_program(&mut self) {
        self.cpu.clear();
        self.next_tick = None;
        self.mode = Mode::Normal;
        self.selected = 0;
        self.drain_events();
        self.status = "New program.".into();
    }

    pub fn add_rows(&mut self, rows: usize) {
        self.status = match self.cpu.grow(rows) {
            Ok(()) => format!("Memory: {} words", self.cpu.mem.len()),
            Err(e) => format!("Error: {}", e),
        };
    }

    pub fn select(&mut self, delta: isize) {
        let last = self.cpu.mem.len().saturating_sub(1);
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    /// Save to the image path, if there is one.
    pub fn save(&mut self) {
        let Some(path) = self.path.as_ref() else {
            self.status = "No file to save to.".into();
            return;
        };
        self.status = match std::fs::write(path, self.cpu.save()) {
            Ok(()) => format!("Saved {}", path.display()),
            Err(e) => format!("Error: {}", e),
        };
    }

    /// Enter a line-editing mode.
    pub fn begin(&mut self, mode: Mode) {
        self.mode = mode;
        self.line.clear();
        self.status = match mode {
            Mode::Normal => String::new(),
            Mode::Input(kind) => self.input_prompt(kind),
            Mode::Edit => format!(
                "New value for word {} ({} bits, 0b.., or decimal):",
                self.selected,
                self.cpu.arch().word_width()
            ),
            Mode::Resize => format!("Now {}. Enter W,O[;exempt]:", self.cpu.arch()),
        };
    }

    /// Abandon the line being typed.
    pub fn cancel(&mut self) {
        if let Mode::Input(_) = self.mode {
            self.cpu.stop();
            self.next_tick = None;
        }
        self.mode = Mode::Normal;
        self.line.clear();
        self.status = "Cancelled.".into();
    }

    /// Apply the line being typed.
    pub fn submit(&mut self) {
        let line = std::mem::take(&mut self.line);
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);
        match mode {
            Mode::Normal => {}
            Mode::Input(_) => {
                self.prompt.borrow_mut().answer = Some(line);
                if self.cpu.is_running() {
                    self.next_tick = Some(Instant::now());
                } else {
                    self.step();
                }
            }
            Mode::Edit => {
                let arch = self.cpu.arch();
                self.status = match parse_word(&line, &arch)
                    .map_err(|e| e.to_string())
                    .and_then(|w| self.cpu.set_word(self.selected, w).map_err(|e| e.to_string()))
                {
                    Ok(()) => format!("Word {} set.", self.selected),
                    Err(e) => format!("Error: {}", e),
                };
            }
            Mode::Resize => self.resize(&line),
        }
    }

    fn resize(&mut self, line: &str) {
        let (widths, exempt) = line.split_once(';').unwrap_or((line, ""));
        let parsed: Vec<u32> = widths
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        let [word_width, opcode_width] = parsed[..] else {
            self.status = "Expected W,O".into();
            return;
        };
        let arch = match Architecture::new(word_width, opcode_width) {
            Ok(arch) => arch,
            Err(e) => {
                self.status = format!("Error: {}", e);
                return;
            }
        };

        let exempt = parse_exempt_list(exempt);
        let mut conflicts = Vec::new();
        let mut resolver = |_: &Transform, affected: &[usize]| {
            conflicts.extend_from_slice(affected);
            Some(Vec::new())
        };
        self.status = match self.cpu.reconfigure_with(arch, &exempt, &mut resolver) {
            Ok(report) => format!(
                "Now {}: {} remapped, {} exempt (conflicts at {:?})",
                arch, report.remapped, report.exempted, conflicts
            ),
            Err(e) => format!("Error: {}", e),
        };
    }

    fn input_prompt(&self, kind: InputKind) -> String {
        let arch = self.cpu.arch();
        match kind {
            InputKind::Integer if self.prompt.borrow().retry => format!(
                "Not a number. Enter an integer ({} to {}):",
                arch.min_value(),
                arch.max_value()
            ),
            InputKind::Integer => {
                format!("Enter an integer ({} to {}):", arch.min_value(), arch.max_value())
            }
            InputKind::Ascii if self.prompt.borrow().retry => format!(
                "Invalid. Enter up to {} ASCII characters:",
                arch.ascii_capacity()
            ),
            InputKind::Ascii => format!("Enter up to {} ASCII characters:", arch.ascii_capacity()),
        }
    }

    /// Turn engine events into status text and prompts.
    fn drain_events(&mut self) {
        let events: Vec<CpuEvent> = self.events.borrow_mut().drain(..).collect();
        for event in events {
            match event {
                CpuEvent::Stepped { pc, instruction, acc } => {
                    self.status = format!("PC={:04}: {:<10} ACC={}", pc, instruction, acc);
                }
                CpuEvent::AwaitingInput(kind) => self.begin(Mode::Input(kind)),
                CpuEvent::Halted => {
                    self.status = format!("Halted after {} cycles", self.cpu.cycles);
                }
                CpuEvent::Fault(e) => self.status = format!("Error: {}", e),
                CpuEvent::Output(_) | CpuEvent::StateChanged(_) => {}
            }
        }
    }

    /// Disassembly of the selected word.
    pub fn selected_disassembly(&self) -> String {
        disassemble_word(self.cpu.mem.read(self.selected as u64), &self.cpu.arch())
    }
}

/// Run the debugger on a loaded CPU.
pub fn run_debugger(cpu: Cpu, path: Option<PathBuf>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(cpu, path);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(app.poll_timeout(Instant::now()))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.mode == Mode::Normal {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => app.step(),
                            KeyCode::Char('r') => app.toggle_run(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Char('n') => app.new_program(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('e') => app.begin(Mode::Edit),
                            KeyCode::Char('c') => app.begin(Mode::Resize),
                            KeyCode::Char('a') => app.add_rows(16),
                            KeyCode::Char('w') => app.save(),
                            KeyCode::Char('+') => app.adjust_frequency(1),
                            KeyCode::Char('-') => app.adjust_frequency(-1),
                            KeyCode::Up => app.select(-1),
                            KeyCode::Down => app.select(1),
                            KeyCode::PageUp => app.select(-16),
                            KeyCode::PageDown => app.select(16),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Enter => app.submit(),
                            KeyCode::Esc => app.cancel(),
                            KeyCode::Backspace => {
                                app.line.pop();
                            }
                            KeyCode::Char(c) => app.line.push(c),
                            _ => {}
                        }
                    }
                }
            }
        }

        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
