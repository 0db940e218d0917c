//! Program image loading.
//!
//! An image is any number of header bytes, then a sentinel byte, then the
//! memory contents as little-endian 32-bit words. The sentinel is part of the
//! payload: it is the low byte of word 0.

use crate::config::MachineConfig;
use crate::vm::memory::Memory;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// What a load consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// Bytes skipped before the sentinel.
    pub header_bytes: usize,
    /// Words copied into memory.
    pub words: usize,
}

/// Fill `memory` from an image stream.
///
/// Reading stops when memory is full or the stream ends on a word boundary.
/// Cells past the end of the payload are left untouched, which for a fresh
/// memory means zero.
pub fn load_image<R: Read>(reader: R, memory: &mut Memory, sentinel: u8) -> Result<LoadSummary, LoadError> {
    let mut reader = BufReader::new(reader);
    let header_bytes = skip_header(&mut reader, sentinel)?;

    let cells = memory.as_mut_slice();
    let mut words = 0;
    let mut buf = [0u8; 4];
    while words < cells.len() {
        match read_word(&mut reader, &mut buf)? {
            Some(word) => {
                cells[words] = word;
                words += 1;
            }
            None => break,
        }
    }

    debug!(header_bytes, words, capacity = cells.len(), "loaded program image");
    Ok(LoadSummary { header_bytes, words })
}

/// Open an image file and load it into a fresh memory sized by `config`.
pub fn load_file<P: AsRef<Path>>(path: P, config: &MachineConfig) -> Result<(Memory, LoadSummary), LoadError> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| LoadError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
    let mut memory = Memory::with_capacity(config.memory_words);
    let summary = load_image(file, &mut memory, config.sentinel)?;
    Ok((memory, summary))
}

/// Consume bytes up to, but not including, the sentinel.
fn skip_header<R: BufRead>(reader: &mut R, sentinel: u8) -> Result<usize, LoadError> {
    let mut skipped = 0;
    loop {
        let chunk = match reader.fill_buf() {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(LoadError::IoError(e.to_string())),
        };
        if chunk.is_empty() {
            return Err(LoadError::MissingSentinel { sentinel, scanned: skipped });
        }
        match chunk.iter().position(|&b| b == sentinel) {
            Some(pos) => {
                reader.consume(pos);
                return Ok(skipped + pos);
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
                skipped += len;
            }
        }
    }
}

/// Read one little-endian word. `None` on a clean end of stream.
fn read_word<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> Result<Option<i32>, LoadError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(LoadError::TruncatedWord { bytes: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(LoadError::IoError(e.to_string())),
        }
    }
    Ok(Some(i32::from_le_bytes(*buf)))
}

/// Errors that can occur while loading an image.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("payload marker {sentinel:#04x} not found after {scanned} bytes")]
    MissingSentinel { sentinel: u8, scanned: usize },

    #[error("image ends in the middle of a word ({bytes} of 4 bytes)")]
    TruncatedWord { bytes: usize },
}
