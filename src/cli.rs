// src/cli.rs

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Syntax-check and run untrusted code in Python, TypeScript, C# or Go.
///
/// Limits come from the optional config file, then from the environment
/// (`EXECUTION_TIMEOUT`, `MAX_OUTPUT_SIZE`, ...).
#[derive(Parser, Debug)]
#[command(name = "polyexec", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check syntax, then run the code and (if configured) review it.
    Validate {
        #[command(flatten)]
        source: Source,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputMode::Simple)]
        output: OutputMode,
    },

    /// Check syntax only. Nothing is executed.
    Check {
        #[command(flatten)]
        source: Source,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputMode::Simple)]
        output: OutputMode,
    },

    /// List supported languages.
    Languages,
}

#[derive(Args, Debug)]
pub struct Source {
    /// Language identifier (python, typescript, csharp, go, or an alias)
    #[arg(short, long)]
    pub language: String,

    #[command(flatten)]
    pub input: Input,
}

/// Where the code comes from. Exactly one of `--file`, `--code`, `--prompt`.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Input {
    /// Read the code from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Pass the code inline
    #[arg(long)]
    pub code: Option<String>,

    /// Ask the configured generator to write the code
    #[arg(long)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// One line of JSON
    Json,
    /// Indented JSON
    Pretty,
    /// Human-readable summary
    Simple,
}
