// src/main.rs

//! polyexec
//!
//! Entry point for the polyexec CLI.
//!
//! Responsibilities of this file:
//! - Load `.env` and install the log subscriber
//! - Parse CLI arguments
//! - Hand off to the runner
//!
//! Logs go to stderr so stdout stays machine-readable.

mod cli;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = cli::Cli::parse();

    runner::run(cli).await
}
