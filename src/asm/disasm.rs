//! Disassembler for VSML programs.
//!
//! Converts memory words back to readable assembly, and builds the
//! per-word views shown by the debugger (bits, mnemonic, location, hex,
//! decimal).

use crate::cpu::decode::{decode, split};
use crate::word::{arith, Architecture, Word};
use serde::Serialize;

/// Every reading of one memory word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordView {
    /// W binary digits (more if the word is wider than W).
    pub raw_bits: String,
    /// Mnemonic, or `None` when the opcode field is invalid.
    pub mnemonic: Option<&'static str>,
    /// The address field.
    pub address: u64,
    pub hex: String,
    /// Signed decimal value.
    pub decimal: i64,
}

/// Build the view of a word.
pub fn view(word: Word, arch: &Architecture) -> WordView {
    let width = arch.word_width() as usize;
    let (_, address) = split(word, arch);
    WordView {
        raw_bits: format!("{:0width$b}", word, width = width),
        mnemonic: decode(word, arch).ok().map(|i| i.opcode.mnemonic()),
        address,
        hex: format!("{:0digits$X}", word, digits = width.div_ceil(4)),
        decimal: arith::word_value(word, arch.word_width()),
    }
}

/// Disassemble a single word to text.
pub fn disassemble_word(word: Word, arch: &Architecture) -> String {
    match decode(word, arch) {
        Ok(decoded) => decoded.to_string(),
        Err(_) => format!("??? ; {:#x}", word),
    }
}

/// Disassemble a slice of words.
pub fn disassemble(words: &[Word], arch: &Architecture) -> String {
    let mut output = String::new();
    output.push_str(&format!("; VSML Disassembly ({})\n", arch));
    output.push_str("; -----------------\n\n");

    let width = arch.word_width() as usize;
    for (addr, &word) in words.iter().enumerate() {
        let line = disassemble_word(word, arch);
        output.push_str(&format!(
            "{:04}: {:<12} ; {:0width$b} {:>6}\n",
            addr,
            line,
            word,
            arith::word_value(word, arch.word_width()),
            width = width
        ));
    }

    output
}
