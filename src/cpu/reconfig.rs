//! Remapping stored words when the word or opcode width changes.
//!
//! A word carries its opcode in its top bits, so changing W or O moves the
//! opcode field. Every word with a nonzero opcode is re-encoded so it still
//! decodes to the same instruction; words listed as exempt keep their raw
//! bits. Changing both widths runs the word-width transform first, then the
//! opcode-width transform.

use crate::word::{arith::mask, ArchError, Architecture, Word};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three distinct resize transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeAxis {
    /// W changes, O stays.
    WordWidth,
    /// O grows from 4 to 5 bits; the top address bit joins the opcode.
    OpcodeWiden,
    /// O shrinks from 5 to 4 bits; the top opcode bit is lost.
    OpcodeNarrow,
}

/// One step of a reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub axis: ResizeAxis,
    pub from: Architecture,
    pub to: Architecture,
}

impl Transform {
    /// The steps needed to go from `from` to `to`, in order.
    pub fn plan(from: Architecture, to: Architecture) -> Result<Vec<Transform>, ArchError> {
        let mut steps = Vec::with_capacity(2);
        let mut current = from;

        if to.word_width() != current.word_width() {
            let next = current.with_word_width(to.word_width())?;
            steps.push(Transform {
                axis: ResizeAxis::WordWidth,
                from: current,
                to: next,
            });
            current = next;
        }

        if to.opcode_width() != current.opcode_width() {
            let next = current.with_opcode_width(to.opcode_width())?;
            let axis = if next.opcode_width() > current.opcode_width() {
                ResizeAxis::OpcodeWiden
            } else {
                ResizeAxis::OpcodeNarrow
            };
            steps.push(Transform {
                axis,
                from: current,
                to: next,
            });
        }

        Ok(steps)
    }

    /// Whether this word would lose or change meaning under the transform.
    pub fn conflicts(&self, word: Word) -> bool {
        let old_aw = self.from.address_width();
        let ins = word >> old_aw;
        match self.axis {
            ResizeAxis::WordWidth => ins != 0,
            ResizeAxis::OpcodeWiden => (word >> (old_aw - 1)) & 1 == 1,
            ResizeAxis::OpcodeNarrow => ins > mask(self.to.opcode_width()),
        }
    }

    /// Indices of all conflicting words.
    pub fn affected(&self, words: &[Word]) -> Vec<usize> {
        words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.conflicts(**w))
            .map(|(i, _)| i)
            .collect()
    }

    /// Re-encode one word.
    pub fn remap(&self, word: Word) -> Word {
        let old_aw = self.from.address_width();
        let new_aw = self.to.address_width();
        let ins = word >> old_aw;
        if ins == 0 {
            return word;
        }
        match self.axis {
            ResizeAxis::WordWidth | ResizeAxis::OpcodeWiden => {
                (word & mask(old_aw) & mask(new_aw)).wrapping_add(ins.wrapping_shl(new_aw))
            }
            ResizeAxis::OpcodeNarrow => word
                .wrapping_sub(ins << old_aw)
                .wrapping_add((ins & mask(self.to.opcode_width())) << new_aw),
        }
    }

    /// Remap every word not listed in `exempt`.
    pub fn apply(&self, words: &mut [Word], exempt: &[usize]) {
        for (i, word) in words.iter_mut().enumerate() {
            if !exempt.contains(&i) {
                *word = self.remap(*word);
            }
        }
    }
}

/// Host decision for conflicting words.
///
/// Given the affected indices, return the indices to leave untouched, or
/// `None` to cancel the whole reconfiguration.
pub trait ConflictResolver {
    fn resolve(&mut self, transform: &Transform, affected: &[usize]) -> Option<Vec<usize>>;
}

impl<F> ConflictResolver for F
where
    F: FnMut(&Transform, &[usize]) -> Option<Vec<usize>>,
{
    fn resolve(&mut self, transform: &Transform, affected: &[usize]) -> Option<Vec<usize>> {
        self(transform, affected)
    }
}

/// Summary of a completed reconfiguration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigReport {
    /// Words whose bits changed.
    pub remapped: usize,
    /// Words left untouched because they were exempt.
    pub exempted: usize,
}

/// Compute the remapped contents, asking `resolver` about each conflicting
/// step. Indices in `pinned` keep their raw bits through every step, with
/// or without conflicts. Nothing is mutated; an aborted run returns
/// `ReconfigError::Aborted`.
pub fn remap_all<R: ConflictResolver + ?Sized>(
    words: &[Word],
    from: Architecture,
    to: Architecture,
    pinned: &[usize],
    resolver: &mut R,
) -> Result<(Vec<Word>, ReconfigReport), ReconfigError> {
    let mut out = words.to_vec();
    let mut exempted = std::collections::BTreeSet::new();

    for step in Transform::plan(from, to)? {
        let affected: Vec<usize> = step
            .affected(&out)
            .into_iter()
            .filter(|i| !pinned.contains(i))
            .collect();
        let mut exempt = pinned.to_vec();
        if !affected.is_empty() {
            let chosen = resolver
                .resolve(&step, &affected)
                .ok_or(ReconfigError::Aborted)?;
            exempt.extend(chosen);
        }
        exempted.extend(exempt.iter().copied().filter(|&i| i < out.len()));
        step.apply(&mut out, &exempt);
    }

    let remapped = out.iter().zip(words).filter(|(a, b)| a != b).count();
    Ok((
        out,
        ReconfigReport {
            remapped,
            exempted: exempted.len(),
        },
    ))
}

/// Parse a comma-separated list of indices, ignoring anything non-numeric.
pub fn parse_exempt_list(text: &str) -> Vec<usize> {
    text.split(',')
        .map(str::trim)
        .filter_map(|item| item.parse().ok())
        .collect()
}

/// Errors that can occur during reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconfigError {
    #[error("reconfiguration cancelled")]
    Aborted,

    #[error("cannot reconfigure while running; stop the machine first")]
    Busy,

    #[error("invalid architecture: {0}")]
    Architecture(#[from] ArchError),
}
