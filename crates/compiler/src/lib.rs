//! Cog Compiler Library
//!
//! A single-pass compiler for the Cog programming language: source text in,
//! AArch64 (Apple ABI) assembly out. Lexing, parsing, type checking and code
//! generation are interleaved; each top-level declaration is fully emitted
//! before the next one is parsed, and no intermediate representation is kept
//! beyond per-expression trees.
//!
//! ```rust
//! let asm = cogc::compile("func add(a: Int, b: Int): Int { return a + b; }").unwrap();
//! assert!(asm.contains("_add:"));
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod consteval;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod symtab;
pub mod typecheck;
pub mod types;

pub use config::CompilerConfig;
pub use error::CompileError;
pub use parser::Parser;

use std::fs;
use std::path::Path;

/// Compile Cog source text to assembly with the default configuration.
pub fn compile(source: &str) -> Result<String, CompileError> {
    compile_with_config(source, &CompilerConfig::default())
}

/// Compile Cog source text to assembly.
pub fn compile_with_config(
    source: &str,
    config: &CompilerConfig,
) -> Result<String, CompileError> {
    Parser::with_config(source, config)?.compile()
}

/// Compile a Cog source file to an assembly file.
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<(), String> {
    compile_file_with_config(source_path, output_path, &CompilerConfig::default())
}

/// Compile a Cog source file to an assembly file with custom configuration.
pub fn compile_file_with_config(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("Failed to read source file: {}", e))?;
    let assembly = compile_with_config(&source, config).map_err(|e| e.to_string())?;
    fs::write(output_path, assembly)
        .map_err(|e| format!("Failed to write output file: {}", e))?;
    Ok(())
}
