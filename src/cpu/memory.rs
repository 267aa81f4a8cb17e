//! Main memory.
//!
//! Memory is a growable row of words. It starts with 16 zeroed cells and
//! auto-extends with zeros whenever execution touches an address past the
//! end, up to a fixed limit.

use crate::word::Word;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of cells in a fresh memory.
pub const INITIAL_WORDS: usize = 16;

/// Default ceiling on auto-extension.
pub const DEFAULT_LIMIT: usize = 1 << 20;

/// Word-addressed memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Word>,
    limit: usize,
}

impl Memory {
    /// Create a new memory of [`INITIAL_WORDS`] zeroed cells.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Create a fresh memory with a custom auto-extension limit.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            cells: vec![0; INITIAL_WORDS],
            limit,
        }
    }

    /// Build a memory from existing contents.
    pub fn from_words(words: Vec<Word>) -> Self {
        Self {
            cells: words,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Number of cells currently allocated.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Auto-extension limit in words.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// All cells in address order.
    pub fn words(&self) -> &[Word] {
        &self.cells
    }

    /// Read a cell without extending; cells past the end read as zero.
    #[inline]
    pub fn read(&self, addr: u64) -> Word {
        usize::try_from(addr)
            .ok()
            .and_then(|index| self.cells.get(index).copied())
            .unwrap_or(0)
    }

    /// Read a cell, zero-extending memory up to it if needed.
    pub fn fetch(&mut self, addr: u64) -> Result<Word, MemoryError> {
        let index = self.ensure(addr)?;
        Ok(self.cells[index])
    }

    /// Write a cell, zero-extending memory up to it if needed.
    pub fn write(&mut self, addr: u64, value: Word) -> Result<(), MemoryError> {
        let index = self.ensure(addr)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Append `rows` zeroed cells.
    pub fn grow(&mut self, rows: usize) -> Result<(), MemoryError> {
        let new_len = self.cells.len().saturating_add(rows);
        if new_len > self.limit {
            return Err(MemoryError::LimitExceeded {
                address: new_len as u64 - 1,
                limit: self.limit,
            });
        }
        self.cells.resize(new_len, 0);
        Ok(())
    }

    /// Reset to [`INITIAL_WORDS`] zeroed cells.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.cells.resize(INITIAL_WORDS, 0);
    }

    /// Replace all contents, keeping the limit.
    pub fn replace(&mut self, words: Vec<Word>) {
        self.cells = words;
    }

    /// Dump a range of cells (for debugging views).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }

    fn ensure(&mut self, addr: u64) -> Result<usize, MemoryError> {
        let index = usize::try_from(addr)
            .ok()
            .filter(|&i| i < self.limit || i < self.cells.len())
            .ok_or(MemoryError::LimitExceeded {
                address: addr,
                limit: self.limit,
            })?;
        if index >= self.cells.len() {
            self.cells.resize(index + 1, 0);
        }
        Ok(index)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address lies beyond the auto-extension limit.
    #[error("memory address {address} exceeds the limit of {limit} words")]
    LimitExceeded { address: u64, limit: usize },
}
