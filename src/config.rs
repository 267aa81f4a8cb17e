//! Engine configuration.
//!
//! Loaded from JSON; every field is optional:
//! ```json
//! { "word_width": 16, "opcode_width": 4, "frequency_hz": 4,
//!   "initial_words": 16, "memory_limit": 1048576, "input": "interactive" }
//! ```

use crate::cpu::execute::DEFAULT_FREQUENCY_HZ;
use crate::cpu::memory::{DEFAULT_LIMIT, INITIAL_WORDS};
use crate::word::{ArchError, Architecture};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Where `INP`/`INA` read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Ask the host for each value.
    #[default]
    Interactive,
    /// Consume a prepared list of lines.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub word_width: u32,
    pub opcode_width: u32,
    pub frequency_hz: u32,
    pub initial_words: usize,
    pub memory_limit: usize,
    pub input: InputMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            word_width: Architecture::DEFAULT.word_width(),
            opcode_width: Architecture::DEFAULT.opcode_width(),
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            initial_words: INITIAL_WORDS,
            memory_limit: DEFAULT_LIMIT,
            input: InputMode::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the values and return the architecture they describe.
    pub fn validate(&self) -> Result<Architecture, ConfigError> {
        if self.frequency_hz == 0 {
            return Err(ConfigError::Frequency);
        }
        Ok(Architecture::new(self.word_width, self.opcode_width)?)
    }
}

/// Errors that can occur loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(String),

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("invalid architecture: {0}")]
    Architecture(#[from] ArchError),

    #[error("frequency_hz must be at least 1")]
    Frequency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.frequency_hz, 4);
        assert_eq!(config.initial_words, 16);
        assert_eq!(config.input, InputMode::Interactive);
        assert_eq!(config.validate().unwrap(), Architecture::DEFAULT);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{"word_width": 32, "input": "batch"}"#).unwrap();
        assert_eq!(config.word_width, 32);
        assert_eq!(config.opcode_width, 4);
        assert_eq!(config.input, InputMode::Batch);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"wordwidth": 32}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = EngineConfig::default();
        config.opcode_width = 6;
        assert_eq!(
            config.validate(),
            Err(ConfigError::Architecture(ArchError::OpcodeWidth(6)))
        );

        let mut config = EngineConfig::default();
        config.frequency_hz = 0;
        assert_eq!(config.validate(), Err(ConfigError::Frequency));
    }
}
