//! Input and output for `INP`/`INA`/`OUT`/`OUA`.
//!
//! Input comes either from the host, one request per instruction
//! ([`InputFeed::Interactive`]), or from a pre-loaded queue of lines
//! ([`InputFeed::Batch`]). Output always accumulates in a single
//! [`Output`] buffer.

use crate::word::{arith, Architecture, Word};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;

/// Which kind of value an input instruction is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    /// `INP`: a signed integer.
    Integer,
    /// `INA`: a short ASCII string.
    Ascii,
}

/// Host-side source of interactive input.
///
/// Returning `None` means no value is available yet; the engine suspends
/// the instruction and asks again on the next step. Blocking hosts simply
/// never return `None`.
pub trait InputProvider {
    /// Ask for an integer. Values outside `min..=max` are accepted and
    /// wrapped by the engine.
    fn request_integer(&mut self, min: i64, max: i64, retry: bool) -> Option<i128>;

    /// Ask for up to `max_len` ASCII characters. `retry` is set when the
    /// previous answer was rejected.
    fn request_ascii(&mut self, max_len: usize, retry: bool) -> Option<String>;
}

/// Newline-delimited input consumed first-in first-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFeed {
    lines: VecDeque<String>,
}

impl BatchFeed {
    /// Create a feed from text, one value per line.
    pub fn new(text: &str) -> Self {
        let mut feed = Self::default();
        feed.push_text(text);
        feed
    }

    /// Append more lines.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.lines
            .extend(text.split('\n').map(|l| l.trim_end_matches('\r').to_string()));
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The unconsumed input, as it would be shown in an input box.
    pub fn remaining(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Consume the next line as an integer; unparsable or missing lines read as 0.
    pub fn next_integer(&mut self, arch: &Architecture) -> i64 {
        let line = self.lines.pop_front().unwrap_or_default();
        parse_integer(&line, arch.word_width()).unwrap_or(0)
    }

    /// Consume up to `floor(W/8)` characters of the next line, packed into
    /// one word. The rest of the line stays queued.
    pub fn next_ascii(&mut self, arch: &Architecture) -> Word {
        let line = self.lines.pop_front().unwrap_or_default();
        let split = line
            .char_indices()
            .nth(arch.ascii_capacity())
            .map_or(line.len(), |(i, _)| i);
        let (head, rest) = line.split_at(split);
        let word = pack_ascii(head.chars().map(|c| if c.is_ascii() { c as u8 } else { 0 }));
        if !rest.is_empty() {
            self.lines.push_front(rest.to_string());
        }
        word
    }
}

/// Where input instructions get their values.
pub enum InputFeed {
    Interactive(Box<dyn InputProvider>),
    Batch(BatchFeed),
}

impl InputFeed {
    /// Read a value for `INP`, wrapped into the signed range.
    pub fn read_integer(&mut self, arch: &Architecture) -> Option<i64> {
        match self {
            InputFeed::Interactive(provider) => provider
                .request_integer(arch.min_value(), arch.max_value(), false)
                .map(|v| arith::reduce_to_range(v, arch.word_width())),
            InputFeed::Batch(feed) => Some(feed.next_integer(arch)),
        }
    }

    /// Read a value for `INA`, re-asking until the answer fits.
    pub fn read_ascii(&mut self, arch: &Architecture) -> Option<Word> {
        match self {
            InputFeed::Interactive(provider) => {
                let capacity = arch.ascii_capacity();
                let mut retry = false;
                loop {
                    let text = provider.request_ascii(capacity, retry)?;
                    if text.chars().count() <= capacity && text.is_ascii() {
                        return Some(pack_ascii(text.bytes()));
                    }
                    retry = true;
                }
            }
            InputFeed::Batch(feed) => Some(feed.next_ascii(arch)),
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, InputFeed::Interactive(_))
    }

    /// The batch queue, when in batch mode.
    pub fn batch_mut(&mut self) -> Option<&mut BatchFeed> {
        match self {
            InputFeed::Batch(feed) => Some(feed),
            InputFeed::Interactive(_) => None,
        }
    }
}

impl Default for InputFeed {
    fn default() -> Self {
        InputFeed::Batch(BatchFeed::default())
    }
}

impl fmt::Debug for InputFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFeed::Interactive(_) => f.write_str("Interactive"),
            InputFeed::Batch(feed) => f.debug_tuple("Batch").field(&feed.len()).finish(),
        }
    }
}

/// Parse an integer the way the input box does, wrapping it into W bits.
///
/// Accepts an optional sign with decimal digits, or a `0x`/`0o`/`0b`
/// prefixed literal. Blank text reads as zero. Returns `None` for anything
/// else.
pub fn parse_integer(text: &str, width: u32) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }

    let prefix = |p: &str| {
        text.get(..2)
            .filter(|head| head.eq_ignore_ascii_case(p))
            .map(|_| &text[2..])
    };
    let (radix, body, negative) = if let Some(rest) = prefix("0x") {
        (16, rest, false)
    } else if let Some(rest) = prefix("0o") {
        (8, rest, false)
    } else if let Some(rest) = prefix("0b") {
        (2, rest, false)
    } else if let Some(rest) = text.strip_prefix('-') {
        (10, rest, true)
    } else {
        (10, text.strip_prefix('+').unwrap_or(text), false)
    };
    if body.is_empty() {
        return None;
    }

    // Reduce digit by digit so arbitrarily long inputs still wrap exactly.
    let modulus = 1u128 << width;
    let mut acc: u128 = 0;
    for c in body.chars() {
        let digit = c.to_digit(radix)? as u128;
        acc = (acc * radix as u128 + digit) % modulus;
    }
    let raw = if negative { (modulus - acc) % modulus } else { acc };
    Some(arith::word_value(raw as Word, width))
}

/// Pack character codes into a word, first character most significant.
pub fn pack_ascii(codes: impl IntoIterator<Item = u8>) -> Word {
    codes
        .into_iter()
        .fold(0, |word: Word, code| (word << 8) | code as Word)
}

/// Unpack a word into characters for `OUA`.
///
/// Bytes are taken from the low end in whole 8-bit groups and emitted most
/// significant first; zero bytes are dropped.
pub fn unpack_ascii(word: Word, width: u32) -> String {
    let bits = width.max(Word::BITS - word.leading_zeros());
    (0..bits / 8)
        .rev()
        .map(|group| ((word >> (group * 8)) & 0xFF) as u8)
        .filter(|&code| code != 0)
        .map(char::from)
        .collect()
}

/// Host-side receiver of output lines.
pub trait OutputSink {
    fn append_line(&mut self, text: &str);
}

/// Forwards each line to an [`std::io::Write`] (e.g. stdout).
pub struct WriteSink<W: Write>(pub W);

impl<W: Write> OutputSink for WriteSink<W> {
    fn append_line(&mut self, text: &str) {
        // Output must never stall the engine; a closed pipe just drops lines.
        let _ = writeln!(self.0, "{}", text);
        let _ = self.0.flush();
    }
}

/// The accumulated program output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    text: String,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Completed output lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Take the buffered text, leaving the buffer empty.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl OutputSink for Output {
    fn append_line(&mut self, text: &str) {
        self.text.push_str(text);
        self.text.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(w: u32) -> Architecture {
        Architecture::new(w, 4).unwrap()
    }

    /// Provider answering from a fixed script.
    struct Scripted {
        integers: Vec<i128>,
        strings: Vec<&'static str>,
        asked: usize,
    }

    impl InputProvider for Scripted {
        fn request_integer(&mut self, _min: i64, _max: i64, _retry: bool) -> Option<i128> {
            self.asked += 1;
            if self.integers.is_empty() {
                None
            } else {
                Some(self.integers.remove(0))
            }
        }

        fn request_ascii(&mut self, _max_len: usize, _retry: bool) -> Option<String> {
            self.asked += 1;
            if self.strings.is_empty() {
                None
            } else {
                Some(self.strings.remove(0).to_string())
            }
        }
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("42", 16), Some(42));
        assert_eq!(parse_integer("  -7 ", 16), Some(-7));
        assert_eq!(parse_integer("+3", 16), Some(3));
        assert_eq!(parse_integer("0x1F", 16), Some(31));
        assert_eq!(parse_integer("0b101", 16), Some(5));
        assert_eq!(parse_integer("", 16), Some(0));
        assert_eq!(parse_integer("abc", 16), None);
        assert_eq!(parse_integer("-", 16), None);
    }

    #[test]
    fn test_parse_integer_wraps() {
        assert_eq!(parse_integer("128", 8), Some(-128));
        assert_eq!(parse_integer("-129", 8), Some(127));
        assert_eq!(parse_integer("340282366920938463463374607431768211457", 8), Some(1));
    }

    #[test]
    fn test_ascii_packing() {
        assert_eq!(pack_ascii(*b"AB"), 0x4142);
        assert_eq!(unpack_ascii(0x4142, 16), "AB");
        assert_eq!(unpack_ascii(0x0041, 16), "A");
        // Trailing bits that do not fill a byte are ignored.
        assert_eq!(unpack_ascii(0x4142, 20), "AB");
        assert_eq!(unpack_ascii(0, 16), "");
    }

    #[test]
    fn test_batch_integers() {
        let a = arch(8);
        let mut feed = BatchFeed::new("5\n300\nnope\n");
        assert_eq!(feed.next_integer(&a), 5);
        assert_eq!(feed.next_integer(&a), 44);
        assert_eq!(feed.next_integer(&a), 0);
        assert_eq!(feed.next_integer(&a), 0);
        assert!(feed.is_empty());
        // Exhausted feed keeps answering zero.
        assert_eq!(feed.next_integer(&a), 0);
    }

    #[test]
    fn test_batch_ascii_requeues_rest() {
        let a = arch(16);
        let mut feed = BatchFeed::new("Hello\nX");
        assert_eq!(feed.next_ascii(&a), pack_ascii(*b"He"));
        assert_eq!(feed.remaining(), "llo\nX");
        assert_eq!(feed.next_ascii(&a), pack_ascii(*b"ll"));
        assert_eq!(feed.next_ascii(&a), pack_ascii(*b"o"));
        assert_eq!(feed.next_ascii(&a), pack_ascii(*b"X"));
    }

    #[test]
    fn test_batch_ascii_zeroes_non_ascii() {
        let a = arch(16);
        let mut feed = BatchFeed::new("é!");
        assert_eq!(feed.next_ascii(&a), 0x0021);
    }

    #[test]
    fn test_interactive_integer_wraps() {
        let a = arch(8);
        let mut feed = InputFeed::Interactive(Box::new(Scripted {
            integers: vec![200],
            strings: vec![],
            asked: 0,
        }));
        assert_eq!(feed.read_integer(&a), Some(-56));
        assert_eq!(feed.read_integer(&a), None);
    }

    #[test]
    fn test_interactive_ascii_reprompts() {
        let a = arch(16);
        let mut feed = InputFeed::Interactive(Box::new(Scripted {
            integers: vec![],
            strings: vec!["toolong", "é", "ok"],
            asked: 0,
        }));
        assert_eq!(feed.read_ascii(&a), Some(pack_ascii(*b"ok")));
    }

    #[test]
    fn test_output_buffer() {
        let mut out = Output::new();
        out.append_line("12");
        out.append_line("hi");
        assert_eq!(out.as_str(), "12\nhi\n");
        assert_eq!(out.lines().collect::<Vec<_>>(), ["12", "hi"]);
        assert_eq!(out.take(), "12\nhi\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_sink() {
        let mut sink = WriteSink(Vec::new());
        sink.append_line("7");
        assert_eq!(sink.0, b"7\n");
    }
}
