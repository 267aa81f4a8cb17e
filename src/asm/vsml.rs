//! VSML image file format.
//!
//! A `.vsml` image is plain text holding the whole machine state.
//!
//! Version 2 (read and write):
//! ```text
//! v2;<O>,<W>,<PC binary>,<ACC binary>
//! <word 0 as W binary digits>
//! <word 1 as W binary digits>
//! ...
//! ```
//!
//! Version 1 (read only) fixed the opcode width at 4 and used an older
//! opcode order:
//! ```text
//! v1;<W>,<PC decimal>,<ACC decimal>
//! <all words concatenated as one binary string>
//! ```

use crate::cpu::memory::INITIAL_WORDS;
use crate::word::{arith, Architecture, Word};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Legacy (v1) opcode index -> current catalogue index.
pub const LEGACY_OPCODE_MAP: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 13];

/// Opcode width of every v1 image.
const LEGACY_OPCODE_WIDTH: u32 = 4;

/// Persisted machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub arch: Architecture,
    pub pc: u64,
    pub acc: i64,
    pub memory: Vec<Word>,
}

impl Snapshot {
    /// A fresh machine: zeroed registers and sixteen zeroed words.
    pub fn new(arch: Architecture) -> Self {
        Self {
            arch,
            pc: 0,
            acc: 0,
            memory: vec![0; INITIAL_WORDS],
        }
    }
}

/// Image format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    V1,
    V2,
}

/// Identify the format from the version tag before the first `;`.
pub fn detect_version(text: &str) -> Result<FormatVersion, VsmlError> {
    let tag = text.split(';').next().unwrap_or_default().trim_start();
    match tag {
        "v1" => Ok(FormatVersion::V1),
        "v2" => Ok(FormatVersion::V2),
        other => Err(VsmlError::UnknownVersion(other.chars().take(16).collect())),
    }
}

/// Encode a snapshot in the current (v2) format.
pub fn encode(snapshot: &Snapshot) -> String {
    let arch = &snapshot.arch;
    let width = arch.word_width() as usize;
    let mut out = format!(
        "v2;{},{},{:b},{:b}",
        arch.opcode_width(),
        arch.word_width(),
        snapshot.pc,
        arith::to_unsigned(snapshot.acc, arch.word_width()),
    );
    for word in &snapshot.memory {
        out.push('\n');
        out.push_str(&format!("{:0width$b}", word, width = width));
    }
    out
}

/// Decode an image of either version.
pub fn decode(text: &str) -> Result<Snapshot, VsmlError> {
    match detect_version(text)? {
        FormatVersion::V2 => decode_v2(text),
        FormatVersion::V1 => decode_v1(text),
    }
}

fn decode_v2(text: &str) -> Result<Snapshot, VsmlError> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default().trim();
    let fields = header
        .strip_prefix("v2;")
        .ok_or_else(|| parse_error(1, "expected a `v2;` header"))?;

    let fields: Vec<&str> = fields.split(',').collect();
    let [opcode_width, word_width, pc, acc] = fields[..] else {
        return Err(parse_error(
            1,
            format!("expected 4 header fields, found {}", fields.len()),
        ));
    };

    let opcode_width: u32 = parse_decimal(opcode_width, 1, "opcode width")?;
    let word_width: u32 = parse_decimal(word_width, 1, "word width")?;
    let arch = Architecture::new(word_width, opcode_width).map_err(|e| parse_error(1, e))?;
    let pc = parse_binary(pc, 1, "program counter")?;
    let acc = arith::word_value(parse_binary(acc, 1, "accumulator")?, word_width);

    let mut memory = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        memory.push(parse_binary(line, i + 2, "memory word")?);
    }

    Ok(Snapshot {
        arch,
        pc,
        acc,
        memory,
    })
}

fn decode_v1(text: &str) -> Result<Snapshot, VsmlError> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default().trim();
    let fields = header
        .strip_prefix("v1;")
        .ok_or_else(|| parse_error(1, "expected a `v1;` header"))?;

    let fields: Vec<&str> = fields.split(',').collect();
    let [word_width, pc, acc] = fields[..] else {
        return Err(parse_error(
            1,
            format!("expected 3 header fields, found {}", fields.len()),
        ));
    };

    let word_width: u32 = parse_decimal(word_width, 1, "word width")?;
    let arch =
        Architecture::new(word_width, LEGACY_OPCODE_WIDTH).map_err(|e| parse_error(1, e))?;
    let pc: u64 = parse_decimal(pc, 1, "program counter")?;
    let acc: u64 = parse_decimal(acc, 1, "accumulator")?;
    let acc = arith::reduce_to_range(acc as i128, word_width);

    let blob = lines
        .next()
        .ok_or_else(|| parse_error(2, "missing memory line"))?
        .trim();

    let address_width = arch.address_width();
    let mut memory = Vec::with_capacity(blob.len() / word_width as usize + 1);
    for chunk in blob.as_bytes().chunks(word_width as usize) {
        let bits = std::str::from_utf8(chunk).map_err(|e| parse_error(2, e))?;
        let segment = parse_binary(bits, 2, "memory word")?;
        let legacy = segment >> address_width;
        let current = usize::try_from(legacy)
            .ok()
            .and_then(|i| LEGACY_OPCODE_MAP.get(i))
            .ok_or_else(|| parse_error(2, format!("legacy opcode {} has no mapping", legacy)))?;
        memory.push((segment & arch.address_mask()) + ((*current as Word) << address_width));
    }

    Ok(Snapshot {
        arch,
        pc,
        acc,
        memory,
    })
}

fn parse_error(line: usize, message: impl ToString) -> VsmlError {
    VsmlError::ParseError {
        line,
        message: message.to_string(),
    }
}

fn parse_binary(field: &str, line: usize, what: &str) -> Result<Word, VsmlError> {
    let field = field.trim();
    if field.is_empty() || field.len() > 64 || !field.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(parse_error(line, format!("{} is not a binary number: {:?}", what, field)));
    }
    Word::from_str_radix(field, 2).map_err(|e| parse_error(line, format!("{}: {}", what, e)))
}

fn parse_decimal<T: std::str::FromStr>(field: &str, line: usize, what: &str) -> Result<T, VsmlError> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(parse_error(line, format!("{} is not a decimal number: {:?}", what, field)));
    }
    field
        .parse()
        .map_err(|_| parse_error(line, format!("{} out of range: {}", what, field)))
}

/// Load an image file from disk.
pub fn load_vsml<P: AsRef<Path>>(path: P) -> Result<Snapshot, VsmlError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| VsmlError::IoError(e.to_string()))?;
    decode(&text)
}

/// Save an image file (always v2).
pub fn save_vsml<P: AsRef<Path>>(path: P, snapshot: &Snapshot) -> Result<(), VsmlError> {
    std::fs::write(path.as_ref(), encode(snapshot))
        .map_err(|e| VsmlError::IoError(e.to_string()))
}

/// Errors that can occur reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VsmlError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("unknown file format: {0:?}")]
    UnknownVersion(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{decode as decode_word, Instruction, Opcode};

    fn arch(w: u32, o: u32) -> Architecture {
        Architecture::new(w, o).unwrap()
    }

    #[test]
    fn test_encode_v2() {
        let snapshot = Snapshot {
            arch: arch(8, 4),
            pc: 2,
            acc: -1,
            memory: vec![0x13, 0x00, 0x7F],
        };
        assert_eq!(
            encode(&snapshot),
            "v2;4,8,10,11111111\n00010011\n00000000\n01111111"
        );
    }

    #[test]
    fn test_v2_roundtrip() {
        let snapshot = Snapshot {
            arch: arch(16, 5),
            pc: 9,
            acc: -300,
            memory: vec![0x1005, 0xFFFF, 0, 42],
        };
        assert_eq!(decode(&encode(&snapshot)).unwrap(), snapshot);
    }

    #[test]
    fn test_v2_tolerates_blank_lines_and_crlf() {
        let text = "v2;4,8,0,101\r\n00000001\r\n\r\n00000010\r\n";
        let snapshot = decode(text).unwrap();
        assert_eq!(snapshot.acc, 5);
        assert_eq!(snapshot.memory, vec![1, 2]);
    }

    #[test]
    fn test_v2_rejects_malformed() {
        assert!(matches!(decode("v2;3,8,0,0"), Err(VsmlError::ParseError { line: 1, .. })));
        assert!(matches!(decode("v2;4,8,0"), Err(VsmlError::ParseError { line: 1, .. })));
        assert!(matches!(decode("v2;4,8,2,0"), Err(VsmlError::ParseError { line: 1, .. })));
        assert!(matches!(decode("v2;4,99,0,0"), Err(VsmlError::ParseError { line: 1, .. })));
        assert!(matches!(
            decode("v2;4,8,0,0\n00000001\n0000x001"),
            Err(VsmlError::ParseError { line: 3, .. })
        ));
    }

    #[test]
    fn test_unknown_version() {
        assert_eq!(decode("v3;4,8,0,0"), Err(VsmlError::UnknownVersion("v3".into())));
        assert!(matches!(decode("garbage"), Err(VsmlError::UnknownVersion(_))));
    }

    #[test]
    fn test_v1_remaps_legacy_opcodes() {
        // Legacy opcode 7 with address 3, then legacy LDA 1.
        let text = "v1;8,1,5\n0111001100010001";
        let snapshot = decode(text).unwrap();
        assert_eq!(snapshot.arch, arch(8, 4));
        assert_eq!(snapshot.pc, 1);
        assert_eq!(snapshot.acc, 5);
        assert_eq!(
            decode_word(snapshot.memory[0], &snapshot.arch).unwrap(),
            Instruction::new(Opcode::Out, 3)
        );
        assert_eq!(snapshot.memory[0] >> 4, 8);
        assert_eq!(
            decode_word(snapshot.memory[1], &snapshot.arch).unwrap(),
            Instruction::new(Opcode::Lda, 1)
        );
    }

    #[test]
    fn test_v1_accumulator_wraps() {
        let snapshot = decode("v1;8,0,255\n").unwrap();
        assert_eq!(snapshot.acc, -1);
        assert!(snapshot.memory.is_empty());
    }

    #[test]
    fn test_v1_rejects_unmapped_opcode() {
        assert!(matches!(
            decode("v1;8,0,0\n11110000"),
            Err(VsmlError::ParseError { line: 2, .. })
        ));
        assert!(decode("v1;8,0,0").is_err());
    }

    #[test]
    fn test_new_snapshot() {
        let snapshot = Snapshot::new(Architecture::default());
        assert_eq!(snapshot.memory.len(), 16);
        assert_eq!(encode(&snapshot).lines().count(), 17);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn snapshot() -> impl Strategy<Value = Snapshot> {
        (8u32..=64, prop_oneof![Just(4u32), Just(5u32)]).prop_flat_map(|(w, o)| {
            let arch = Architecture::new(w, o).unwrap();
            (
                any::<u64>(),
                arith::min_signed(w)..=arith::max_signed(w),
                prop::collection::vec(0..=arch.word_mask(), 0..32),
            )
                .prop_map(move |(pc, acc, memory)| Snapshot { arch, pc, acc, memory })
        })
    }

    proptest! {
        #[test]
        fn v2_save_load_roundtrip(s in snapshot()) {
            prop_assert_eq!(decode(&encode(&s)).unwrap(), s);
        }
    }
}
