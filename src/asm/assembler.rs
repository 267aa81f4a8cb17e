//! Simple assembler for VSML programs.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOOP:           ; Define a label
//!     INP         ; Read into ACC (operand defaults to 0)
//!     ADD SUM     ; Add the word at label SUM
//!     JMP LOOP    ; Jump to label
//!     HLT         ; Halt
//!
//!     ORG 50      ; Set origin address
//! SUM: DAT -3     ; Signed data value
//!     BIN 1010    ; Raw bits
//! ```
//!
//! Mnemonics are case-insensitive. Numbers may be decimal, `0x` hex or
//! `0b` binary.

use crate::asm::vsml::Snapshot;
use crate::cpu::decode::{encode, Instruction, Opcode};
use crate::cpu::memory::{DEFAULT_LIMIT, INITIAL_WORDS};
use crate::word::{arith, Architecture, Word};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Assemble source code into memory words, starting at address 0.
pub fn assemble(source: &str, arch: &Architecture) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new(*arch);
    asm.assemble(source)
}

/// Assemble into a loadable machine image (at least sixteen words).
pub fn assemble_image(source: &str, arch: &Architecture) -> Result<Snapshot, AssemblerError> {
    let mut memory = assemble(source, arch)?;
    if memory.len() < INITIAL_WORDS {
        memory.resize(INITIAL_WORDS, 0);
    }
    Ok(Snapshot {
        arch: *arch,
        pc: 0,
        acc: 0,
        memory,
    })
}

/// Parse the text typed into a memory cell.
///
/// A `0b` literal or a string of exactly W binary digits is taken as raw
/// bits; anything else must be a signed decimal (or `0x` hex) that fits the
/// word. A shorter run of `0`/`1` digits is decimal, so write `0b1010` for
/// ten.
///
/// ```
/// use vsml::asm::parse_word;
/// use vsml::Architecture;
///
/// let arch = Architecture::new(8, 4).unwrap();
/// assert_eq!(parse_word("00001010", &arch), Ok(10)); // exactly W digits
/// assert_eq!(parse_word("0b1010", &arch), Ok(10));
/// assert!(parse_word("1010", &arch).is_err()); // decimal 1010 does not fit
/// assert_eq!(parse_word("-1", &arch), Ok(0xFF));
/// assert_eq!(parse_word("0x7F", &arch), Ok(0x7F));
/// ```
pub fn parse_word(text: &str, arch: &Architecture) -> Result<Word, AssemblerError> {
    let text = text.trim();
    let width = arch.word_width() as usize;
    let is_bits = !text.is_empty() && text.bytes().all(|b| b == b'0' || b == b'1');
    if is_bits && text.len() == width {
        return Word::from_str_radix(text, 2).map_err(|e| syntax(1, e));
    }
    let value = parse_number(text).ok_or_else(|| syntax(1, format!("not a number: {:?}", text)))?;
    check_data(value, arch, 1)
}

/// How an unresolved label is patched in pass 2.
#[derive(Debug, Clone, Copy)]
enum Fixup {
    Address(Opcode),
    Data,
}

/// The assembler state.
struct Assembler {
    arch: Architecture,
    /// Current address (origin).
    current_addr: u64,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u64>,
    /// Pending references: (address, label, fixup, source line).
    pending: Vec<(u64, String, Fixup, usize)>,
    /// Output words, indexed by address.
    output: Vec<Word>,
}

impl Assembler {
    fn new(arch: Architecture) -> Self {
        Self {
            arch,
            current_addr: 0,
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        // Pass 1: collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        }
        .trim();

        if line.is_empty() {
            return Ok(());
        }

        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if !is_label(&label) {
                return Err(syntax(line_num, format!("invalid label {:?}", label)));
            }
            if self.symbols.insert(label.clone(), self.current_addr).is_some() {
                return Err(AssemblerError::DuplicateLabel {
                    line: line_num,
                    label,
                });
            }

            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_statement(rest, line_num);
            }
            return Ok(());
        }

        self.process_statement(line, line_num)
    }

    fn process_statement(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let (mnemonic, operand) = match parts[..] {
            [m] => (m.to_uppercase(), None),
            [m, op] => (m.to_uppercase(), Some(op)),
            _ => return Err(syntax(line_num, "expected at most one operand")),
        };

        match mnemonic.as_str() {
            // ==================== Directives ====================
            "ORG" => {
                let text = operand.ok_or_else(|| syntax(line_num, "ORG requires an address"))?;
                let value = parse_number(text)
                    .ok_or_else(|| syntax(line_num, format!("invalid address {:?}", text)))?;
                if !(0..DEFAULT_LIMIT as i128).contains(&value) {
                    return Err(AssemblerError::ValueOutOfRange {
                        line: line_num,
                        value,
                    });
                }
                self.current_addr = value as u64;
            }

            "DAT" => {
                let text = operand.ok_or_else(|| syntax(line_num, "DAT requires a value"))?;
                let word = match parse_number(text) {
                    Some(value) => check_data(value, &self.arch, line_num)?,
                    None => self.reference(text, Fixup::Data, line_num)?,
                };
                self.emit(word);
            }

            "BIN" => {
                let text = operand.ok_or_else(|| syntax(line_num, "BIN requires bits"))?;
                let valid = text.bytes().all(|b| b == b'0' || b == b'1');
                if !valid || text.len() > self.arch.word_width() as usize {
                    return Err(syntax(
                        line_num,
                        format!("expected up to {} binary digits", self.arch.word_width()),
                    ));
                }
                let word = Word::from_str_radix(text, 2).map_err(|e| syntax(line_num, e))?;
                self.emit(word);
            }

            // ==================== Instructions ====================
            _ => {
                let opcode = Opcode::from_str(&mnemonic).map_err(|_| {
                    AssemblerError::UnknownMnemonic {
                        line: line_num,
                        mnemonic: mnemonic.clone(),
                    }
                })?;
                if !opcode.is_available(&self.arch) {
                    return Err(AssemblerError::UnavailableOpcode {
                        line: line_num,
                        mnemonic: mnemonic.clone(),
                        opcode_width: self.arch.opcode_width(),
                    });
                }
                let address = match operand {
                    None => 0,
                    Some(text) => match parse_number(text) {
                        Some(value) => check_address(value, &self.arch, line_num)?,
                        None => self.reference(text, Fixup::Address(opcode), line_num)?,
                    },
                };
                self.emit(encode(Instruction::new(opcode, address), &self.arch));
            }
        }

        Ok(())
    }

    /// Record a label use to patch in pass 2; returns a placeholder.
    fn reference(&mut self, text: &str, fixup: Fixup, line_num: usize) -> Result<u64, AssemblerError> {
        let label = text.to_uppercase();
        if !is_label(&label) {
            return Err(syntax(line_num, format!("invalid operand {:?}", text)));
        }
        self.pending.push((self.current_addr, label, fixup, line_num));
        Ok(0)
    }

    fn emit(&mut self, word: Word) {
        let index = self.current_addr as usize;
        if index >= self.output.len() {
            self.output.resize(index + 1, 0);
        }
        self.output[index] = word;
        self.current_addr += 1;
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (addr, label, fixup, line_num) in &self.pending {
            let target = *self
                .symbols
                .get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;

            let word = match fixup {
                Fixup::Address(opcode) => {
                    let address = check_address(target as i128, &self.arch, *line_num)?;
                    encode(Instruction::new(*opcode, address), &self.arch)
                }
                Fixup::Data => check_data(target as i128, &self.arch, *line_num)?,
            };
            self.output[*addr as usize] = word;
        }
        Ok(())
    }
}

fn syntax(line: usize, message: impl ToString) -> AssemblerError {
    AssemblerError::SyntaxError {
        line,
        message: message.to_string(),
    }
}

fn is_label(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a decimal, `0x` or `0b` number.
fn parse_number(text: &str) -> Option<i128> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = body.to_ascii_lowercase();
    let magnitude = if let Some(hex) = lower.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i128::from_str_radix(bin, 2).ok()?
    } else if !lower.is_empty() && lower.bytes().all(|b| b.is_ascii_digit()) {
        lower.parse().ok()?
    } else {
        return None;
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn check_address(value: i128, arch: &Architecture, line: usize) -> Result<u64, AssemblerError> {
    if (0..=arch.max_address() as i128).contains(&value) {
        Ok(value as u64)
    } else {
        Err(AssemblerError::AddressOutOfRange {
            line,
            address: value,
            max: arch.max_address(),
        })
    }
}

/// Signed values must fit W bits; non-negative ones may use all W bits.
fn check_data(value: i128, arch: &Architecture, line: usize) -> Result<Word, AssemblerError> {
    if value < 0 && value >= arch.min_value() as i128 {
        Ok(arith::to_unsigned(value as i64, arch.word_width()))
    } else if value >= 0 && value <= arch.word_mask() as i128 {
        Ok(value as Word)
    } else {
        Err(AssemblerError::ValueOutOfRange { line, value })
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("line {line}: {mnemonic} is not in the {opcode_width}-bit instruction set")]
    UnavailableOpcode {
        line: usize,
        mnemonic: String,
        opcode_width: u32,
    },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("address out of range on line {line}: {address} (max {max})")]
    AddressOutOfRange { line: usize, address: i128, max: u64 },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i128 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::decode;

    fn arch(w: u32, o: u32) -> Architecture {
        Architecture::new(w, o).unwrap()
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Simple test program
            LDA 10
            add 11
            STA 12
            HLT
        "#;

        let a = Architecture::DEFAULT;
        let result = assemble(source, &a).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(decode(result[1], &a).unwrap(), Instruction::new(Opcode::Add, 11));
        assert_eq!(result[3], 0);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        START:
            LDA VALUE
            JMP END
            NOP
        END: HLT
        VALUE: DAT 7
        "#;

        let a = Architecture::DEFAULT;
        let result = assemble(source, &a).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(decode(result[0], &a).unwrap(), Instruction::new(Opcode::Lda, 4));
        assert_eq!(decode(result[1], &a).unwrap(), Instruction::new(Opcode::Jmp, 3));
        assert_eq!(result[4], 7);
    }

    #[test]
    fn test_assemble_data() {
        let source = r#"
            DAT 42
            DAT -17
            DAT 0x10
            BIN 1010
            DAT start
        start:
        "#;

        let a = arch(8, 4);
        let result = assemble(source, &a).unwrap();
        assert_eq!(result, vec![42, 0xEF, 16, 0b1010, 5]);
    }

    #[test]
    fn test_org() {
        let a = Architecture::DEFAULT;
        let result = assemble("NOP\nORG 4\nHLT", &a).unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(decode(result[0], &a).unwrap().opcode, Opcode::Nop);
    }

    #[test]
    fn test_assemble_errors() {
        let a = arch(8, 4);
        assert!(matches!(
            assemble("FOO 1", &a),
            Err(AssemblerError::UnknownMnemonic { line: 1, .. })
        ));
        assert!(matches!(
            assemble("ADDS 1", &a),
            Err(AssemblerError::UnavailableOpcode { opcode_width: 4, .. })
        ));
        assert!(matches!(
            assemble("LDA 16", &a),
            Err(AssemblerError::AddressOutOfRange { max: 15, .. })
        ));
        assert!(matches!(
            assemble("DAT 300", &a),
            Err(AssemblerError::ValueOutOfRange { value: 300, .. })
        ));
        assert!(matches!(
            assemble("JMP nowhere", &a),
            Err(AssemblerError::UndefinedLabel { .. })
        ));
        assert!(matches!(
            assemble("x: NOP\nx: NOP", &a),
            Err(AssemblerError::DuplicateLabel { line: 2, .. })
        ));
        assert!(matches!(
            assemble("BIN 102", &a),
            Err(AssemblerError::SyntaxError { .. })
        ));
    }

    #[test]
    fn test_assemble_image_pads() {
        let image = assemble_image("HLT", &Architecture::DEFAULT).unwrap();
        assert_eq!(image.memory.len(), 16);
        assert_eq!(image.pc, 0);
    }

    #[test]
    fn test_parse_word() {
        let a = arch(8, 4);
        assert_eq!(parse_word("10000001", &a), Ok(0x81));
        assert_eq!(parse_word("-1", &a), Ok(0xFF));
        assert_eq!(parse_word("101", &a), Ok(101));
        assert_eq!(parse_word("0b101", &a), Ok(5));
        assert_eq!(parse_word("1010", &arch(16, 4)), Ok(1010));
        assert_eq!(parse_word("0000000000001010", &arch(16, 4)), Ok(10));
        assert!(parse_word("-129", &a).is_err());
        assert!(parse_word("x", &a).is_err());
    }

    #[test]
    fn test_sample_program() {
        use crate::cpu::{BatchFeed, Cpu, InputFeed};

        let source = include_str!("../../samples/average.asm");
        let image = assemble_image(source, &Architecture::DEFAULT).unwrap();
        let mut cpu = Cpu::new();
        cpu.restore(image);
        cpu.set_input(InputFeed::Batch(BatchFeed::new("4\n8\n-1")));
        cpu.run_to_halt(Some(1000)).unwrap();
        assert!(cpu.is_halted());
        assert_eq!(cpu.output().as_str(), "6\n");
    }
}
