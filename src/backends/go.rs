// src/backends/go.rs

//! Go: compiled via `go build`, then the binary is run.
//!
//! `go run` is avoided because it folds the program's exit status into its
//! own (always 1), which would hide `os.Exit(n)`.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::backends::{
    check_with_tool, execute_with_tool, execution_outcome, Backend, Toolbox, Toolchain,
};
use crate::engine::{Diagnostic, ExecutionResult, SyntaxCheck};
use crate::language::Language;
use crate::process::{Captured, RunFailure, RunSpec};

const SOURCE_STEM: &str = "main";

pub struct GoBackend {
    tools: Arc<Toolbox>,
    go: Toolchain,
    gofmt: Toolchain,
}

impl GoBackend {
    pub fn new(tools: Arc<Toolbox>, go: impl Into<String>, gofmt: impl Into<String>) -> Self {
        Self {
            tools,
            go: Toolchain {
                language: Language::Go,
                name: "Go",
                program: go.into(),
                missing_markers: &[],
            },
            gofmt: Toolchain {
                language: Language::Go,
                name: "Go",
                program: gofmt.into(),
                missing_markers: &[],
            },
        }
    }
}

#[async_trait]
impl Backend for GoBackend {
    fn language(&self) -> Language {
        Language::Go
    }

    async fn validate_syntax(&self, code: &str) -> Result<SyntaxCheck> {
        let ws = self.tools.stage(SOURCE_STEM, Language::Go.extension(), code)?;

        // -l keeps the formatted source off stdout; errors still go to stderr.
        let spec = RunSpec::new(&self.gofmt.program)
            .arg("-l")
            .arg("-e")
            .arg(ws.file())
            .current_dir(ws.dir());

        check_with_tool(&self.tools, &self.gofmt, &ws, spec, parse_gofmt_errors).await
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let ws = self.tools.stage(SOURCE_STEM, Language::Go.extension(), code)?;
        let budget = self.tools.runner.default_timeout();
        let started = Instant::now();

        let binary = ws
            .dir()
            .join(if cfg!(windows) { "main.exe" } else { "main" });

        // Relative source path keeps the workspace location out of build errors.
        let build = RunSpec::new(&self.go.program)
            .arg("build")
            .arg("-o")
            .arg(&binary)
            .arg(ws.file_name())
            .current_dir(ws.dir());

        let built = execute_with_tool(&self.tools, &self.go, build).await;
        if !built.success {
            tracing::debug!(exit_code = built.exit_code, "go build failed");
            return Ok(built);
        }
        if let Some(fault) = missing_build_output(&binary) {
            return Ok(fault);
        }

        // Build and run share one wall-clock budget.
        let remaining = budget.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Ok(ExecutionResult::timed_out(Captured::default(), budget));
        }

        let run = RunSpec::new(binary.to_string_lossy().into_owned())
            .current_dir(ws.dir())
            .timeout(remaining);

        Ok(match self.tools.runner.run(run).await {
            Err(RunFailure::ToolNotFound { .. }) => {
                ExecutionResult::fault("Compiled Go program could not be started")
            }
            other => execution_outcome(&self.go, other),
        })
    }
}

fn missing_build_output(binary: &Path) -> Option<ExecutionResult> {
    if binary.is_file() {
        return None;
    }
    tracing::warn!(binary = %binary.display(), "go build succeeded without an executable");
    Some(ExecutionResult::fault(
        "go build reported success but produced no executable",
    ))
}

fn gofmt_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^:]*:(\d+):(\d+):\s*(.+)$").expect("static regex is valid")
    })
}

/// Parse `file:line:col: message` lines from `gofmt -e`.
fn parse_gofmt_errors(out: &Captured) -> Vec<Diagnostic> {
    super::non_empty_lines(&out.stderr)
        .map(|line| match gofmt_line().captures(line) {
            Some(c) => Diagnostic::at(
                c[1].parse().unwrap_or(1),
                c[2].parse().ok(),
                c[3].trim(),
            ),
            None => Diagnostic::new(line.trim()),
        })
        .collect()
}
