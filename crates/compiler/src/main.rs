//! Cog Compiler CLI
//!
//! Reads one Cog source text (a file, or stdin when no input is given) and
//! writes AArch64 assembly (a file, or stdout). Diagnostics go to stderr as
//! `line:col: message` and any failure exits with status 1.

use clap::Parser as ClapParser;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "cogc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cog compiler - compile Cog source to AArch64 assembly", long_about = None)]
struct Cli {
    /// Input source file (reads stdin when omitted)
    input: Option<PathBuf>,

    /// Output assembly path (writes stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compiler configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse and type-check only; discard the generated assembly
    #[arg(long)]
    check: bool,
}

fn read_source(input: Option<&Path>) -> String {
    match input {
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Failed to read {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                eprintln!("Failed to read stdin: {}", e);
                process::exit(1);
            }
            source
        }
    }
}

fn load_config(path: Option<&Path>) -> cogc::CompilerConfig {
    let Some(path) = path else {
        return cogc::CompilerConfig::default();
    };
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path.display(), e);
            process::exit(1);
        }
    };
    match cogc::CompilerConfig::from_toml(&text) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let source = read_source(cli.input.as_deref());
    let config = load_config(cli.config.as_deref());

    let assembly = match cogc::compile_with_config(&source, &config) {
        Ok(assembly) => assembly,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if cli.check {
        return;
    }

    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, assembly) {
                eprintln!("Failed to write {}: {}", path.display(), e);
                process::exit(1);
            }
        }
        None => {
            if let Err(e) = io::stdout().write_all(assembly.as_bytes()) {
                eprintln!("Failed to write stdout: {}", e);
                process::exit(1);
            }
        }
    }
}
