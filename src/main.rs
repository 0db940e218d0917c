//! wordvm - CLI Entry Point
//!
//! Commands:
//! - `wordvm run <image>` - Run an image and decode its listing
//! - `wordvm trace <image>` - Run an image and print its raw output
//! - `wordvm disasm <image>` - Disassemble loaded memory
//! - `wordvm asm <source>` - Assemble to an image
//! - `wordvm check [records]` - Verify decoded records
//! - `wordvm debug <image>` - Interactive debugger

use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wordvm::config::MachineConfig;
use wordvm::diag::LogSink;
use wordvm::vm::{load_file, Machine, Memory};

#[derive(Parser)]
#[command(name = "wordvm")]
#[command(version = "0.1.0")]
#[command(about = "A 32-bit word bytecode machine with a decoder for its process listing")]
struct Cli {
    /// JSON file overriding the machine configuration
    #[arg(long, global = true)]
    config: Option<String>,
    /// Memory capacity in words
    #[arg(long, global = true)]
    memory_words: Option<usize>,
    /// Word index where execution starts
    #[arg(long, global = true)]
    entry_point: Option<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an image and write decoded records to stdout
    Run {
        /// Path to the image file
        image: String,
    },
    /// Run an image and print the lines it emits, undecoded
    Trace {
        /// Path to the image file
        image: String,
    },
    /// Disassemble loaded memory
    Disasm {
        /// Path to the image file
        image: String,
        /// First word to list (default: the entry point)
        #[arg(long)]
        start: Option<usize>,
        /// Number of instructions to list
        #[arg(long, default_value = "64")]
        count: usize,
    },
    /// Assemble source to an image file
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
        /// Text written before the payload
        #[arg(long, default_value = "")]
        header: String,
    },
    /// Check decoded records for a fan-in of four
    Check {
        /// Records file (default: stdin)
        records: Option<String>,
    },
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the image file
        image: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "wordvm=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli);

    match cli.command {
        Commands::Run { image } => run_image(&image, &config),
        Commands::Trace { image } => trace_image(&image, &config),
        Commands::Disasm { image, start, count } => disassemble_image(&image, &config, start, count),
        Commands::Asm { source, output, header } => assemble_file(&source, output, &header, &config),
        Commands::Check { records } => check_records(records.as_deref()),
        #[cfg(feature = "tui")]
        Commands::Debug { image } => debug_image(&image, &config),
    }
}

/// Defaults, then the config file, then command-line overrides.
fn resolve_config(cli: &Cli) -> MachineConfig {
    let mut config = match &cli.config {
        Some(path) => match MachineConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => fail(format!("Failed to load config: {}", e)),
        },
        None => MachineConfig::default(),
    };
    if let Some(words) = cli.memory_words {
        config.memory_words = words;
    }
    if let Some(entry) = cli.entry_point {
        config.entry_point = entry;
    }
    if let Err(e) = config.validate() {
        fail(format!("Invalid config: {}", e));
    }
    debug!(?config, "configuration");
    config
}

fn fail(message: String) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

fn load(path: &str, config: &MachineConfig) -> Memory {
    match load_file(path, config) {
        Ok((mem, summary)) => {
            info!(path, header_bytes = summary.header_bytes, words = summary.words, "image loaded");
            mem
        }
        Err(e) => fail(format!("Failed to load image: {}", e)),
    }
}

fn run_image(path: &str, config: &MachineConfig) {
    let machine = Machine::with_config(load(path, config), config);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match wordvm::pipeline::run(machine, Arc::new(LogSink), &mut out) {
        Ok(summary) => {
            info!(
                records = summary.records,
                cycles = summary.halt.cycles,
                divide_by_zero = summary.halt.divide_by_zero,
                "done"
            );
        }
        Err(e) => {
            let _ = out.flush();
            fail(format!("Run failed: {}", e));
        }
    }
}

fn trace_image(path: &str, config: &MachineConfig) {
    let machine = Machine::with_config(load(path, config), config);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if let Err(e) = wordvm::pipeline::run_raw(machine, &LogSink, &mut out) {
        let _ = out.flush();
        fail(format!("Run failed: {}", e));
    }
}

fn disassemble_image(path: &str, config: &MachineConfig, start: Option<usize>, count: usize) {
    use wordvm::asm::disassemble;

    let mem = load(path, config);
    let start = start.unwrap_or(config.entry_point.max(0) as usize);
    print!("{}", disassemble(&mem, start, count));
}

fn assemble_file(source_path: &str, output: Option<String>, header: &str, config: &MachineConfig) {
    use wordvm::asm::{assemble_for, save_image};

    let out_path = output.unwrap_or_else(|| {
        match source_path.strip_suffix(".asm") {
            Some(stem) => format!("{}.bin", stem),
            None => format!("{}.bin", source_path),
        }
    });

    eprintln!("📝 Assembling: {} → {}", source_path, out_path);

    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => fail(format!("Failed to read file: {}", e)),
    };

    let words = match assemble_for(&source, config.memory_words) {
        Ok(words) => words,
        Err(e) => fail(format!("Assembly error: {}", e)),
    };

    if let Err(e) = save_image(&out_path, header.as_bytes(), &words, config.sentinel) {
        fail(format!("Failed to save image: {}", e));
    }

    eprintln!("✓ Saved {} words to {}", words.len(), out_path);
}

fn check_records(path: Option<&str>) {
    use wordvm::trace::record::FAN_IN;
    use wordvm::trace::{check_fan_in, read_records};

    let reader: Box<dyn BufRead> = match path {
        Some(path) => match std::fs::File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => fail(format!("Failed to open {}: {}", path, e)),
        },
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let records = match read_records(reader) {
        Ok(records) => records,
        Err(e) => fail(format!("Bad record: {}", e)),
    };

    let mismatches = check_fan_in(&records, FAN_IN);
    for m in &mismatches {
        println!("process {}: {} inbound, expected {}", m.id, m.inbound, FAN_IN);
    }

    if mismatches.is_empty() {
        println!("✓ {} records, every process has {} inbound", records.len(), FAN_IN);
    } else {
        std::process::exit(1);
    }
}

#[cfg(feature = "tui")]
fn debug_image(path: &str, config: &MachineConfig) {
    use wordvm::tui::run_debugger;

    let mem = load(path, config);
    if let Err(e) = run_debugger(mem, config.entry_point) {
        fail(format!("Debugger error: {}", e));
    }
}
