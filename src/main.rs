//! VSML Emulator - CLI Entry Point
//!
//! Commands:
//! - `vsml-emu run <program>` - Run a VSML image or ASM file
//! - `vsml-emu debug <program>` - Interactive debugger
//! - `vsml-emu asm <source>` - Assemble to a VSML image
//! - `vsml-emu disasm <program>` - Disassemble a program
//! - `vsml-emu convert <in> -o <out>` - Rewrite any image as v2
//! - `vsml-emu reconfigure <in>` - Change word/opcode width of an image
//! - `vsml-emu info <program>` - Summarize an image

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use vsml::cpu::io::{parse_integer, BatchFeed, InputFeed, InputProvider, WriteSink};
use vsml::cpu::reconfig::{parse_exempt_list, Transform};
use vsml::cpu::runner::{run_blocking, StopHandle};
use vsml::config::InputMode;
use vsml::{Architecture, Cpu, CpuEvent, EngineConfig, Snapshot};

#[derive(Parser)]
#[command(name = "vsml-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of VSML, a reconfigurable-width two's-complement machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the VSML or ASM file to execute
        program: String,
        /// Run timed at this many instructions per second
        #[arg(short, long)]
        frequency: Option<u32>,
        /// Maximum number of instructions for an untimed run
        #[arg(short, long, default_value = "100000")]
        max_steps: u64,
        /// Read INP/INA values from this file, one per line
        #[arg(short, long)]
        input: Option<String>,
        /// Prompt on the terminal for each INP/INA value (the default)
        #[arg(long, conflicts_with = "batch")]
        interactive: bool,
        /// Read INP/INA values from stdin, one per line
        #[arg(long)]
        batch: bool,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// JSON engine configuration
        #[arg(short, long)]
        config: Option<String>,
        /// Word width for assembling ASM files
        #[arg(long)]
        word_width: Option<u32>,
        /// Opcode width for assembling ASM files
        #[arg(long)]
        opcode_width: Option<u32>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the VSML or ASM file to debug
        program: String,
        /// JSON engine configuration
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Assemble source to a VSML image
    Asm {
        /// Path to the source file
        source: String,
        /// Output VSML file
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, default_value = "16")]
        word_width: u32,
        #[arg(long, default_value = "4")]
        opcode_width: u32,
    },
    /// Disassemble a program to readable text
    Disasm {
        /// Path to the VSML or ASM file
        program: String,
    },
    /// Rewrite an image (v1 or v2) in the current format
    Convert {
        input: String,
        #[arg(short, long)]
        output: String,
    },
    /// Change the word and/or opcode width of an image
    Reconfigure {
        input: String,
        #[arg(long)]
        word_width: Option<u32>,
        #[arg(long)]
        opcode_width: Option<u32>,
        /// Comma-separated word indices to leave untouched
        #[arg(long)]
        exempt: Option<String>,
        /// Remap conflicting words without asking
        #[arg(long)]
        force: bool,
        /// Output file (default: overwrite the input)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print a summary of a program
    Info {
        program: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            program,
            frequency,
            max_steps,
            input,
            interactive,
            batch,
            trace,
            config,
            word_width,
            opcode_width,
        }) => {
            let mut config = load_config(config.as_deref());
            if interactive {
                config.input = InputMode::Interactive;
            } else if batch {
                config.input = InputMode::Batch;
            }
            if let Some(w) = word_width {
                config.word_width = w;
            }
            if let Some(o) = opcode_width {
                config.opcode_width = o;
            }
            if let Some(hz) = frequency {
                config.frequency_hz = hz;
            }
            run_program(&program, &config, frequency.is_some(), max_steps, input, trace);
        }
        Some(Commands::Debug { program, config }) => {
            let config = load_config(config.as_deref());
            debug_program(&program, &config);
        }
        Some(Commands::Asm {
            source,
            output,
            word_width,
            opcode_width,
        }) => {
            assemble_file(&source, output, word_width, opcode_width);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        Some(Commands::Convert { input, output }) => {
            convert_file(&input, &output);
        }
        Some(Commands::Reconfigure {
            input,
            word_width,
            opcode_width,
            exempt,
            force,
            output,
        }) => {
            reconfigure_file(&input, word_width, opcode_width, exempt, force, output);
        }
        Some(Commands::Info { program, json }) => {
            show_info(&program, json);
        }
        None => {
            println!("VSML Emulator v0.1.0");
            println!("A reconfigurable-width two's-complement machine");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Print an error and exit.
fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

fn load_config(path: Option<&str>) -> EngineConfig {
    match path {
        Some(path) => EngineConfig::load(path).unwrap_or_else(|e| fail(e)),
        None => EngineConfig::default(),
    }
}

/// Load a program: `.asm` files are assembled, anything else is a VSML image.
fn read_program(path: &str, config: &EngineConfig) -> Snapshot {
    if path.ends_with(".asm") {
        let source = std::fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
        let arch = config
            .validate()
            .unwrap_or_else(|e| fail(format!("Bad configuration: {}", e)));
        let image = vsml::asm::assemble_image(&source, &arch)
            .unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));
        eprintln!("📝 Assembled {} words ({})", image.memory.len(), arch);
        image
    } else {
        let image = vsml::load_vsml(path)
            .unwrap_or_else(|e| fail(format!("Failed to load image: {}", e)));
        eprintln!("📂 Loaded {} words ({})", image.memory.len(), image.arch);
        image
    }
}

fn make_cpu(config: &EngineConfig, image: Snapshot) -> Cpu {
    let mut cpu = Cpu::with_config(config).unwrap_or_else(|e| fail(format!("Bad configuration: {}", e)));
    cpu.restore(image);
    cpu
}

/// Interactive input from the terminal.
struct StdinProvider;

impl StdinProvider {
    fn read_line(prompt: &str) -> Option<String> {
        eprint!("{}", prompt);
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl InputProvider for StdinProvider {
    fn request_integer(&mut self, min: i64, max: i64, _retry: bool) -> Option<i128> {
        loop {
            // End of input reads as zero, like an exhausted batch feed.
            let Some(line) = Self::read_line(&format!("INP ({} to {}): ", min, max)) else {
                return Some(0);
            };
            match parse_integer(&line, 64) {
                Some(value) => return Some(value as i128),
                None => eprintln!("⚠️  Not a number: {:?}", line),
            }
        }
    }

    fn request_ascii(&mut self, max_len: usize, retry: bool) -> Option<String> {
        if retry {
            eprintln!("⚠️  Up to {} ASCII characters, please.", max_len);
        }
        Some(Self::read_line(&format!("INA (up to {} chars): ", max_len)).unwrap_or_default())
    }
}

fn run_program(
    path: &str,
    config: &EngineConfig,
    timed: bool,
    max_steps: u64,
    input: Option<String>,
    trace: bool,
) {
    println!("🔧 Running: {}", path);

    let image = read_program(path, config);
    let mut cpu = make_cpu(config, image);

    match input {
        Some(input_path) => {
            let text = std::fs::read_to_string(&input_path)
                .unwrap_or_else(|e| fail(format!("Failed to read input: {}", e)));
            cpu.set_input(InputFeed::Batch(BatchFeed::new(&text)));
        }
        None if config.input == InputMode::Batch => {
            let text = io::read_to_string(io::stdin())
                .unwrap_or_else(|e| fail(format!("Failed to read stdin: {}", e)));
            cpu.set_input(InputFeed::Batch(BatchFeed::new(&text)));
        }
        None => cpu.set_input(InputFeed::Interactive(Box::new(StdinProvider))),
    }
    cpu.set_output_sink(Box::new(WriteSink(io::stdout())));

    if trace {
        cpu.subscribe(|event| match event {
            CpuEvent::Stepped {
                pc,
                instruction,
                acc,
            } => eprintln!("{:04}: {:<10} ACC={}", pc, instruction, acc),
            CpuEvent::Fault(e) => eprintln!("fault: {}", e),
            _ => {}
        });
    }

    println!();
    println!("━━━ Execution ━━━");

    let result = if timed {
        run_blocking(&mut cpu, config.frequency_hz, &StopHandle::new())
    } else {
        cpu.run_to_halt(Some(max_steps))
    };
    let executed = result.unwrap_or_else(|e| fail(format!("CPU error at PC={}: {}", cpu.regs.pc, e)));

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", executed);
    println!("State: {:?}", cpu.state());
    println!("PC:  {}", cpu.regs.pc);
    println!("ACC: {}", cpu.regs.acc);

    if !timed && !cpu.is_halted() && executed >= max_steps {
        println!();
        println!("⚠️  Reached max steps limit ({}). Use --max-steps to increase.", max_steps);
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str, config: &EngineConfig) {
    println!("🔍 Loading: {}", path);
    let image = read_program(path, config);
    let cpu = make_cpu(config, image);

    println!("🚀 Launching debugger...");
    println!();

    let save_path = (!path.ends_with(".asm")).then(|| path.into());
    if let Err(e) = vsml::run_debugger(cpu, save_path) {
        fail(format!("Debugger error: {}", e));
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str, _config: &EngineConfig) {
    fail("This build has no debugger; rebuild with the `tui` feature.");
}

fn assemble_file(source_path: &str, output: Option<String>, word_width: u32, opcode_width: u32) {
    let out_path = output.unwrap_or_else(|| source_path.replace(".asm", ".vsml"));

    println!("📝 Assembling: {} → {}", source_path, out_path);

    let arch = Architecture::new(word_width, opcode_width).unwrap_or_else(|e| fail(e));
    let source = std::fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
    let image = vsml::asm::assemble_image(&source, &arch)
        .unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));

    println!("✓ Assembled {} words", image.memory.len());

    if let Err(e) = vsml::save_vsml(&out_path, &image) {
        fail(format!("Failed to save image: {}", e));
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(path: &str) {
    println!("📖 Disassembling: {}", path);
    println!();

    let image = read_program(path, &EngineConfig::default());
    println!("{}", vsml::disassemble(&image.memory, &image.arch));
}

fn convert_file(input: &str, output: &str) {
    let text = std::fs::read_to_string(input)
        .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
    let version = vsml::asm::vsml::detect_version(&text).unwrap_or_else(|e| fail(e));
    let image = vsml::asm::vsml::decode(&text).unwrap_or_else(|e| fail(e));

    if let Err(e) = vsml::save_vsml(output, &image) {
        fail(format!("Failed to save image: {}", e));
    }
    println!("✓ Converted {:?} image {} → {}", version, input, output);
}

fn reconfigure_file(
    input: &str,
    word_width: Option<u32>,
    opcode_width: Option<u32>,
    exempt: Option<String>,
    force: bool,
    output: Option<String>,
) {
    let image = vsml::load_vsml(input).unwrap_or_else(|e| fail(format!("Failed to load image: {}", e)));
    let from = image.arch;
    let to = Architecture::new(
        word_width.unwrap_or(from.word_width()),
        opcode_width.unwrap_or(from.opcode_width()),
    )
    .unwrap_or_else(|e| fail(e));

    let mut cpu = Cpu::with_arch(from);
    cpu.restore(image);

    let exempt_list = exempt.as_deref().map(parse_exempt_list);
    let pinned = exempt_list.clone().unwrap_or_default();
    let mut resolver = |step: &Transform, affected: &[usize]| {
        println!("⚠️  {:?}: {} conflicting words {:?}", step.axis, affected.len(), affected);
        (exempt_list.is_some() || force).then(Vec::new)
    };

    let report = cpu
        .reconfigure_with(to, &pinned, &mut resolver)
        .unwrap_or_else(|e| fail(format!("{} (pass --exempt or --force)", e)));

    let out_path = output.unwrap_or_else(|| input.to_string());
    if let Err(e) = vsml::save_vsml(&out_path, &cpu.snapshot()) {
        fail(format!("Failed to save image: {}", e));
    }
    println!(
        "✓ {} → {}: {} remapped, {} exempt, saved to {}",
        from, to, report.remapped, report.exempted, out_path
    );
}

/// Summary printed by `info`.
#[derive(Serialize)]
struct ImageInfo {
    word_width: u32,
    opcode_width: u32,
    pc: u64,
    acc: i64,
    words: usize,
    nonzero_words: usize,
    next_instruction: String,
}

fn show_info(path: &str, json: bool) {
    let image = read_program(path, &EngineConfig::default());
    let next = image
        .memory
        .get(image.pc as usize)
        .copied()
        .unwrap_or(0);
    let info = ImageInfo {
        word_width: image.arch.word_width(),
        opcode_width: image.arch.opcode_width(),
        pc: image.pc,
        acc: image.acc,
        words: image.memory.len(),
        nonzero_words: image.memory.iter().filter(|&&w| w != 0).count(),
        next_instruction: vsml::asm::disasm::disassemble_word(next, &image.arch),
    };

    if json {
        match serde_json::to_string_pretty(&info) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(e),
        }
        return;
    }

    println!("Architecture: {}", image.arch);
    println!("PC:  {}", info.pc);
    println!("ACC: {}", info.acc);
    println!("Words: {} ({} nonzero)", info.words, info.nonzero_words);
    println!("Next: {}", info.next_instruction);
}
