//! Debugger application state and logic.

use crate::asm::disasm::disassemble_at;
use crate::vm::{Machine, Memory, StepEvent};
use std::collections::HashSet;

/// Output lines kept for display.
const OUTPUT_HISTORY: usize = 256;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Memory as loaded, for reset.
    pub image: Memory,
    /// Entry point, for reset.
    pub entry: i32,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<i32>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// First memory cell shown in the memory view.
    pub mem_scroll: usize,
    /// Most recent emitted lines, oldest first.
    pub output: Vec<String>,
    /// Instructions per tick while running.
    pub steps_per_tick: u32,
}

impl DebuggerApp {
    /// Create a new debugger over loaded memory.
    pub fn new(image: Memory, entry: i32) -> Self {
        let machine = Machine::new(image.clone(), entry);
        Self {
            machine,
            image,
            entry,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: entry.max(0) as usize,
            output: Vec::new(),
            steps_per_tick: 1000,
        }
    }

    fn push_output(&mut self, line: String) {
        if self.output.len() == OUTPUT_HISTORY {
            self.output.remove(0);
        }
        self.output.push(line);
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.machine.is_running() {
            self.status = format!("Machine stopped: {:?}", self.machine.state);
            self.running = false;
            return;
        }

        let ip = self.machine.ip;
        let disasm = self.disassembly_at(ip);
        match self.machine.step() {
            Ok(StepEvent::Quiet) => {
                self.status = format!("IP={}: {}", ip, disasm);
            }
            Ok(StepEvent::Line(line)) => {
                self.push_output(line);
                self.status = format!("IP={}: {}", ip, disasm);
            }
            Ok(StepEvent::DivideByZero) => {
                self.status = format!("IP={}: division by zero, stored 0", ip);
            }
            Ok(StepEvent::Halted { opcode, line }) => {
                if let Some(line) = line {
                    self.push_output(line);
                }
                self.status = format!("Halted on opcode {} at IP={}", opcode, ip);
                self.running = false;
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..self.steps_per_tick {
            if !self.running {
                return;
            }

            if !self.machine.is_running() {
                self.running = false;
                self.status = format!("Stopped after {} cycles", self.machine.cycles);
                return;
            }

            self.step();

            // Check for breakpoint
            let ip = self.machine.ip;
            if self.breakpoints.contains(&ip) {
                self.running = false;
                self.status = format!("Breakpoint at IP={}", ip);
                return;
            }
        }
    }

    /// Toggle breakpoint at current IP.
    pub fn toggle_breakpoint(&mut self) {
        let ip = self.machine.ip;
        if self.breakpoints.remove(&ip) {
            self.status = format!("Removed breakpoint at IP={}", ip);
        } else {
            self.breakpoints.insert(ip);
            self.status = format!("Set breakpoint at IP={}", ip);
        }
    }

    /// Reset the machine to the loaded image.
    pub fn reset(&mut self) {
        self.machine = Machine::new(self.image.clone(), self.entry);
        self.output.clear();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    fn disassembly_at(&self, addr: i32) -> String {
        match usize::try_from(addr) {
            Ok(addr) => disassemble_at(&self.machine.mem, addr).0,
            Err(_) => "???".to_string(),
        }
    }

    /// Disassembly from the current IP onward, following instruction lengths.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(i32, String, bool)> {
        let ip = self.machine.ip;
        let mut addr = match usize::try_from(ip) {
            Ok(addr) => addr,
            Err(_) => return Vec::new(),
        };

        let mut listing = Vec::with_capacity(lines);
        while listing.len() < lines && addr < self.machine.mem.len() {
            let (text, len) = disassemble_at(&self.machine.mem, addr);
            listing.push((addr as i32, text, addr as i32 == ip));
            addr += len;
        }
        listing
    }
}

/// Run the debugger over loaded memory.
pub fn run_debugger(image: Memory, entry: i32) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(image, entry);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Char('g') => {
                            app.mem_scroll = app.machine.ip.max(0) as usize;
                        }
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.machine.mem.len() {
                                app.mem_scroll += 1;
                            }
                        }
                        KeyCode::PageUp => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(16);
                        }
                        KeyCode::PageDown => {
                            app.mem_scroll = (app.mem_scroll + 16).min(app.machine.mem.len().saturating_sub(1));
                        }
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    fn app(source: &str) -> DebuggerApp {
        let words = assemble(source).unwrap();
        let mut mem = Memory::with_capacity(words.len() + 8);
        mem.load_words(0, &words).unwrap();
        DebuggerApp::new(mem, 0)
    }

    #[test]
    fn test_step_collects_output() {
        let mut app = app("PRN 'o'\nPRN 'k'\nPRN 10\nHLT");
        for _ in 0..4 {
            app.step();
        }
        assert_eq!(app.output, vec!["ok".to_string()]);
        assert!(app.machine.is_halted());
        assert!(app.status.starts_with("Halted"));
    }

    #[test]
    fn test_breakpoint_stops_run() {
        let mut app = app("PRN 'a'\nPRN 'b'\nPRN 'c'\nHLT");
        app.breakpoints.insert(4);
        app.run();
        app.tick();
        assert!(!app.running);
        assert_eq!(app.machine.ip, 4);
        assert_eq!(app.status, "Breakpoint at IP=4");
    }

    #[test]
    fn test_reset_restores_image() {
        let mut app = app("ADD 6, 6, 1\nHLT\nDAT 0\nDAT 5");
        app.step();
        assert_eq!(app.machine.mem.get(6), Some(6));
        app.reset();
        assert_eq!(app.machine.mem.get(6), Some(5));
        assert_eq!(app.machine.ip, 0);
    }

    #[test]
    fn test_disassembly_follows_lengths() {
        let app = app("NOT 3, 4\nPRN 10\nHLT");
        let listing = app.get_disassembly(3);
        assert_eq!(listing[0], (0, "NOT 3, 4".to_string(), true));
        assert_eq!(listing[1], (3, "PRN 10".to_string(), false));
        assert_eq!(listing[2], (5, "HLT".to_string(), false));
    }
}
