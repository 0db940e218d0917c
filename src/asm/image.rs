//! Program image writer.
//!
//! The inverse of [`load_image`](crate::vm::load_image): header bytes, then
//! every word little-endian. Word 0 must begin with the sentinel byte so the
//! loader can find it.

use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Write an image to `out`.
pub fn write_image<W: Write>(out: &mut W, header: &[u8], words: &[i32], sentinel: u8) -> Result<(), ImageError> {
    if let Some(offset) = header.iter().position(|&b| b == sentinel) {
        return Err(ImageError::SentinelInHeader { offset });
    }
    match words.first() {
        Some(&first) if first.to_le_bytes()[0] == sentinel => {}
        _ => return Err(ImageError::MissingSentinel { sentinel }),
    }

    out.write_all(header).map_err(|e| ImageError::IoError(e.to_string()))?;
    for word in words {
        out.write_all(&word.to_le_bytes())
            .map_err(|e| ImageError::IoError(e.to_string()))?;
    }
    out.flush().map_err(|e| ImageError::IoError(e.to_string()))
}

/// Save an image to disk.
pub fn save_image<P: AsRef<Path>>(path: P, header: &[u8], words: &[i32], sentinel: u8) -> Result<(), ImageError> {
    let file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    let mut out = std::io::BufWriter::new(file);
    write_image(&mut out, header, words, sentinel)
}

/// Errors that can occur while writing an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("header contains the payload marker at byte {offset}")]
    SentinelInHeader { offset: usize },

    #[error("word 0 must start with the payload marker {sentinel:#04x}")]
    MissingSentinel { sentinel: u8 },
}
