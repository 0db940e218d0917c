//! WebAssembly bindings for the word machine.
//!
//! This module provides JavaScript-friendly wrappers around the core machine.

use crate::asm::assembler::{assemble, assemble_for};
use crate::asm::disasm::disassemble_instruction;
use crate::config::DEFAULT_ENTRY_POINT;
use crate::diag::{CollectingSink, Diagnostic};
use crate::vm::{load_image, Machine, Memory};
use wasm_bindgen::prelude::*;

/// Memory size for browser sessions, far below the native default.
const WASM_MEMORY_WORDS: usize = 1 << 16;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine,
    image: Memory,
    entry: i32,
    output: Vec<String>,
    diagnostics: CollectingSink,
}

#[wasm_bindgen]
impl WasmMachine {
    /// Create a machine with `memory_words` cells (0 picks the browser default).
    #[wasm_bindgen(constructor)]
    pub fn new(memory_words: usize) -> Self {
        let words = if memory_words == 0 { WASM_MEMORY_WORDS } else { memory_words };
        let image = Memory::with_capacity(words);
        Self {
            machine: Machine::new(image.clone(), DEFAULT_ENTRY_POINT),
            image,
            entry: DEFAULT_ENTRY_POINT,
            output: Vec::new(),
            diagnostics: CollectingSink::new(),
        }
    }

    fn install(&mut self, image: Memory, entry: i32) {
        self.machine = Machine::new(image.clone(), entry);
        self.image = image;
        self.entry = entry;
        self.output.clear();
        self.diagnostics = CollectingSink::new();
    }

    /// Load a binary image. Returns the number of payload words read.
    #[wasm_bindgen]
    pub fn load_image(&mut self, bytes: &[u8], sentinel: u8) -> Result<usize, JsError> {
        let mut mem = Memory::with_capacity(self.image.len());
        let summary = load_image(bytes, &mut mem, sentinel).map_err(|e| JsError::new(&e.to_string()))?;
        self.install(mem, DEFAULT_ENTRY_POINT);
        Ok(summary.words)
    }

    /// Load a program from assembly source, starting execution at `entry`.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str, entry: i32) -> Result<usize, JsError> {
        let words = assemble_for(source, self.image.len()).map_err(|e| JsError::new(&e.to_string()))?;
        let mut mem = Memory::with_capacity(self.image.len());
        mem.load_words(0, &words).map_err(|e| JsError::new(&e.to_string()))?;
        self.install(mem, entry);
        Ok(words.len())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let ip = self.machine.ip;
        let text = usize::try_from(ip)
            .map(|addr| disassemble_instruction(&self.machine.mem, addr))
            .unwrap_or_else(|_| "???".to_string());
        self.machine
            .run_limited(1, &mut self.output, &self.diagnostics)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(text)
    }

    /// Run until halt or `max_cycles` instructions. Returns the cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u64, JsError> {
        self.machine
            .run_limited(u64::from(max_cycles), &mut self.output, &self.diagnostics)
            .map_err(|e| JsError::new(&e.to_string()))?;
        Ok(self.machine.cycles)
    }

    /// Reset to the loaded image.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        let image = self.image.clone();
        self.install(image, self.entry);
    }

    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.machine.is_running()
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.machine.is_halted()
    }

    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.machine.cycles
    }

    #[wasm_bindgen]
    pub fn ip(&self) -> i32 {
        self.machine.ip
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.machine.state)
    }

    /// Memory cell at `index`, or 0 past the end.
    #[wasm_bindgen]
    pub fn memory_at(&self, index: usize) -> i32 {
        self.machine.mem.get(index).unwrap_or(0)
    }

    /// A window of memory.
    #[wasm_bindgen]
    pub fn memory_range(&self, start: usize, count: usize) -> Vec<i32> {
        self.machine.mem.dump(start, count).into_iter().map(|(_, value)| value).collect()
    }

    /// Lines printed so far, joined by newlines.
    #[wasm_bindgen]
    pub fn output(&self) -> String {
        self.output.join("\n")
    }

    /// Number of divide-by-zero diagnostics so far.
    #[wasm_bindgen]
    pub fn divide_by_zero(&self) -> usize {
        self.diagnostics
            .entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::DivideByZero { .. }))
            .count()
    }

    /// Machine state as a JSON string.
    #[wasm_bindgen]
    pub fn state_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.machine.snapshot()).map_err(|e| JsError::new(&e.to_string()))
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Assemble source code and return the word count.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<usize, JsError> {
    let words = assemble(source).map_err(|e| JsError::new(&e.to_string()))?;
    Ok(words.len())
}

/// Disassemble one instruction from up to four words.
#[wasm_bindgen]
pub fn wasm_disassemble(words: &[i32]) -> String {
    let mut mem = Memory::with_capacity(words.len());
    match mem.load_words(0, words) {
        Ok(()) => disassemble_instruction(&mem, 0),
        Err(_) => "???".to_string(),
    }
}
