//! Machine configuration.
//!
//! The defaults match the program images this machine was built for. A JSON
//! file may override any subset of the fields.

use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Number of words in memory for the reference program image.
pub const DEFAULT_MEMORY_WORDS: usize = 13_371_111;

/// Word index where execution starts.
pub const DEFAULT_ENTRY_POINT: i32 = 36;

/// Byte that marks the start of the payload in an image file.
pub const DEFAULT_SENTINEL: u8 = b'#';

/// Fixed parameters of one machine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Memory capacity in words.
    pub memory_words: usize,
    /// Initial instruction pointer.
    pub entry_point: i32,
    /// Payload marker byte.
    pub sentinel: u8,
}

impl MachineConfig {
    /// Parse a configuration from JSON text. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: MachineConfig = serde_json::from_str(text)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Check that the entry point lies inside memory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_words == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.entry_point < 0 || self.entry_point as usize >= self.memory_words {
            return Err(ConfigError::EntryOutOfRange {
                entry: self.entry_point,
                memory_words: self.memory_words,
            });
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_words: DEFAULT_MEMORY_WORDS,
            entry_point: DEFAULT_ENTRY_POINT,
            sentinel: DEFAULT_SENTINEL,
        }
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("invalid configuration: {0}")]
    ParseError(String),

    #[error("memory must hold at least one word")]
    EmptyMemory,

    #[error("entry point {entry} is outside memory of {memory_words} words")]
    EntryOutOfRange { entry: i32, memory_words: usize },
}
