//! Word memory.
//!
//! A flat, zero-initialized array of signed 32-bit words. The capacity is
//! chosen once, when the memory is created, and never changes.

use crate::config::DEFAULT_MEMORY_WORDS;
use thiserror::Error;

/// Fixed-capacity word memory.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<i32>,
}

impl Memory {
    /// Create a memory of the default capacity with all cells zeroed.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_WORDS)
    }

    /// Create a zeroed memory holding `words` cells.
    pub fn with_capacity(words: usize) -> Self {
        Self {
            cells: vec![0; words],
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True for a zero-capacity memory.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Resolve `base + delta` to a cell index.
    ///
    /// Addresses are computed in 64 bits so that `ip + operand` cannot wrap
    /// back into range.
    #[inline]
    pub fn index(&self, base: i32, delta: i32) -> Result<usize, MemoryError> {
        let addr = i64::from(base) + i64::from(delta);
        if addr < 0 || addr >= self.cells.len() as i64 {
            return Err(MemoryError::AddressOutOfRange {
                addr,
                capacity: self.cells.len(),
            });
        }
        Ok(addr as usize)
    }

    /// Read the word at `base + delta`.
    #[inline]
    pub fn read(&self, base: i32, delta: i32) -> Result<i32, MemoryError> {
        let index = self.index(base, delta)?;
        Ok(self.cells[index])
    }

    /// Write the word at `base + delta`.
    #[inline]
    pub fn write(&mut self, base: i32, delta: i32, value: i32) -> Result<(), MemoryError> {
        let index = self.index(base, delta)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Read by absolute index, returning `None` past the end.
    pub fn get(&self, index: usize) -> Option<i32> {
        self.cells.get(index).copied()
    }

    /// Copy `words` into memory starting at `start`.
    pub fn load_words(&mut self, start: usize, words: &[i32]) -> Result<(), MemoryError> {
        if start + words.len() > self.cells.len() {
            return Err(MemoryError::ProgramTooLarge {
                size: words.len(),
                available: self.cells.len().saturating_sub(start),
            });
        }
        self.cells[start..start + words.len()].copy_from_slice(words);
        Ok(())
    }

    /// All cells, for loading and inspection.
    pub fn as_slice(&self) -> &[i32] {
        &self.cells
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.cells
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, i32)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
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
        let non_zero = self.cells.iter().filter(|cell| **cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {addr} out of range (0-{})", .capacity.saturating_sub(1))]
    AddressOutOfRange { addr: i64, capacity: usize },

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::with_capacity(64);
        mem.write(10, 5, -42).unwrap();
        assert_eq!(mem.read(15, 0).unwrap(), -42);
        assert_eq!(mem.read(20, -5).unwrap(), -42);
    }

    #[test]
    fn test_memory_bounds() {
        let mem = Memory::with_capacity(8);

        assert!(mem.read(0, 0).is_ok());
        assert!(mem.read(7, 0).is_ok());

        assert_eq!(
            mem.read(4, -5),
            Err(MemoryError::AddressOutOfRange { addr: -1, capacity: 8 })
        );
        assert!(mem.read(4, 4).is_err());
    }

    #[test]
    fn test_address_does_not_wrap() {
        let mem = Memory::with_capacity(8);
        assert!(mem.read(i32::MAX, i32::MAX).is_err());
        assert!(mem.read(i32::MIN, 3).is_err());
    }

    #[test]
    fn test_load_words() {
        let mut mem = Memory::with_capacity(4);
        mem.load_words(1, &[1, 2, 3]).unwrap();
        assert_eq!(mem.as_slice(), &[0, 1, 2, 3]);

        assert_eq!(
            mem.load_words(2, &[9, 9, 9]),
            Err(MemoryError::ProgramTooLarge { size: 3, available: 2 })
        );
    }

    #[test]
    fn test_dump_clamps_to_capacity() {
        let mut mem = Memory::with_capacity(4);
        mem.load_words(0, &[5, 6, 7, 8]).unwrap();
        assert_eq!(mem.dump(2, 10), vec![(2, 7), (3, 8)]);
        assert!(mem.dump(10, 3).is_empty());
    }
}
