// src/backends/mod.rs

//! Language backends.
//!
//! Each backend implements the same two operations on top of the process
//! runner and the workspace manager:
//!
//! - `validate_syntax`: prove the code is malformed without running it
//! - `execute`: run it under the configured time and output bounds
//!
//! Command-line shapes and toolchain error text live in the per-language
//! modules and nowhere else. Adding a language means adding a module here and
//! registering it; nothing upstream changes.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{Config, SYNTAX_CHECK_TIMEOUT};
use crate::engine::{Diagnostic, ExecutionResult, SyntaxCheck};
use crate::language::Language;
use crate::process::{Captured, ProcessRunner, RunFailure, RunSpec};
use crate::workspace::{Workspace, WorkspaceManager};

pub mod csharp;
pub mod go;
pub mod python;
pub mod registry;
pub mod typescript;

pub use registry::BackendRegistry;

/// The validate/execute contract every language implements.
///
/// `Err` is reserved for unexpected infrastructure faults. Bad user code,
/// missing toolchains and timeouts are all expressed in the `Ok` value.
#[async_trait]
pub trait Backend: Send + Sync {
    fn language(&self) -> Language;

    async fn validate_syntax(&self, code: &str) -> Result<SyntaxCheck>;

    async fn execute(&self, code: &str) -> Result<ExecutionResult>;
}

/// Runner and workspace manager shared by all backends.
#[derive(Debug)]
pub struct Toolbox {
    pub runner: ProcessRunner,
    pub workspaces: WorkspaceManager,
}

impl Toolbox {
    pub fn new(config: &Config) -> Self {
        Self {
            runner: ProcessRunner::new(config),
            workspaces: WorkspaceManager::new(config.workspace_root()),
        }
    }

    pub fn from_parts(runner: ProcessRunner, workspaces: WorkspaceManager) -> Self {
        Self { runner, workspaces }
    }

    /// Acquire a workspace and copy `code` into its source file.
    pub fn stage(&self, stem: &str, extension: &str, code: &str) -> Result<Workspace> {
        let ws = self.workspaces.acquire(stem, extension)?;
        ws.write(code)?;
        Ok(ws)
    }
}

/// What a backend knows about the external tool it drives.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub language: Language,
    /// Human name, e.g. ".NET SDK".
    pub name: &'static str,
    pub program: String,
    /// Output fragments that mean "the tool (or a plugin it needs) is not
    /// installed" even though the launcher itself started.
    pub missing_markers: &'static [&'static str],
}

impl Toolchain {
    pub fn missing_message(&self) -> String {
        format!(
            "{} execution requires {} to be installed (tried `{}`)",
            self.language.display_name(),
            self.name,
            self.program
        )
    }

    fn reports_missing(&self, out: &Captured) -> bool {
        self.missing_markers
            .iter()
            .any(|m| out.stderr.contains(m) || out.stdout.contains(m))
    }
}

/// Run an external syntax checker and interpret the result.
///
/// `diagnostics` turns the checker's output, with workspace paths scrubbed, into
/// diagnostics. A clean exit with no diagnostics is valid; a failed exit
/// with none gets a single diagnostic carrying the raw output.
pub(crate) async fn check_with_tool<F>(
    tools: &Toolbox,
    toolchain: &Toolchain,
    ws: &Workspace,
    spec: RunSpec,
    diagnostics: F,
) -> Result<SyntaxCheck>
where
    F: Fn(&Captured) -> Vec<Diagnostic>,
{
    let spec = spec.timeout_at_most(SYNTAX_CHECK_TIMEOUT);

    match tools.runner.run(spec).await {
        Ok(out) => Ok(SyntaxCheck::from_diagnostics(diagnostics(&scrub(ws, out)))),

        Err(RunFailure::NonZeroExit { output, .. }) => {
            let output = scrub(ws, output);
            if toolchain.reports_missing(&output) {
                return Ok(fail_open(toolchain));
            }

            let mut found = diagnostics(&output);
            if found.is_empty() {
                found.push(Diagnostic::new(raw_failure_text(&output)));
            }
            Ok(SyntaxCheck::from_diagnostics(found))
        }

        Err(RunFailure::ToolNotFound { .. }) => Ok(fail_open(toolchain)),

        Err(RunFailure::Timeout { timeout, .. }) => {
            tracing::warn!(language = %toolchain.language, "syntax check timed out");
            Ok(SyntaxCheck::invalid(format!(
                "Syntax check timed out after {} ms",
                timeout.as_millis()
            )))
        }

        Err(e @ RunFailure::Internal { .. }) => Err(e.into()),
    }
}

/// Run the program and translate every runner outcome into an
/// `ExecutionResult`. The child's streams are passed through verbatim.
pub(crate) async fn execute_with_tool(
    tools: &Toolbox,
    toolchain: &Toolchain,
    spec: RunSpec,
) -> ExecutionResult {
    execution_outcome(toolchain, tools.runner.run(spec).await)
}

pub(crate) fn execution_outcome(
    toolchain: &Toolchain,
    result: Result<Captured, RunFailure>,
) -> ExecutionResult {
    match result {
        Ok(out) => ExecutionResult::completed(out),

        Err(RunFailure::NonZeroExit { output, .. }) => {
            if toolchain.reports_missing(&output) {
                tracing::warn!(language = %toolchain.language, program = %toolchain.program, "toolchain component missing");
                return ExecutionResult::fault(toolchain.missing_message());
            }
            ExecutionResult::completed(output)
        }

        Err(RunFailure::ToolNotFound { .. }) => ExecutionResult::fault(toolchain.missing_message()),

        Err(RunFailure::Timeout {
            partial, timeout, ..
        }) => ExecutionResult::timed_out(partial, timeout),

        Err(e @ RunFailure::Internal { .. }) => {
            tracing::error!(language = %toolchain.language, error = %e, "process runner fault");
            ExecutionResult::fault(e.to_string())
        }
    }
}

/// A missing checker cannot prove the code invalid, so it does not block.
fn fail_open(toolchain: &Toolchain) -> SyntaxCheck {
    tracing::warn!(
        language = %toolchain.language,
        program = %toolchain.program,
        "syntax checker unavailable; treating code as valid"
    );
    SyntaxCheck::ok()
}

fn scrub(ws: &Workspace, out: Captured) -> Captured {
    Captured {
        stdout: ws.scrub(&out.stdout),
        stderr: ws.scrub(&out.stderr),
        ..out
    }
}

fn raw_failure_text(out: &Captured) -> String {
    let stderr = out.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = out.stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "Syntax validation failed".to_string()
}

/// Split `text` into non-empty trimmed lines.
pub(crate) fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;

    const MISSING: &str = "polyexec-no-such-tool-7d2e";

    fn toolbox(root: &Path) -> Toolbox {
        Toolbox::from_parts(
            ProcessRunner::with_limits(Duration::from_secs(10), 10_000),
            WorkspaceManager::new(root),
        )
    }

    fn toolchain(program: &str) -> Toolchain {
        Toolchain {
            language: Language::TypeScript,
            name: "ts-node",
            program: program.to_string(),
            missing_markers: &["ts-node: not found"],
        }
    }

    fn sh(script: &str) -> RunSpec {
        RunSpec::new("sh").arg("-c").arg(script)
    }

    fn no_diagnostics(_: &Captured) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn missing_checker_fails_open() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let ws = tools.stage("script", "ts", "let x = 1;").unwrap();

        let check = check_with_tool(&tools, &toolchain(MISSING), &ws, RunSpec::new(MISSING), no_diagnostics)
            .await
            .unwrap();

        assert!(check.is_valid());
        drop(ws);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn missing_runtime_fails_closed_naming_the_toolchain() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let chain = toolchain(MISSING);

        let result = execute_with_tool(&tools, &chain, RunSpec::new(MISSING)).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, crate::process::SENTINEL_EXIT_CODE);
        assert_eq!(result.error, Some(chain.missing_message()));
        assert_eq!(
            chain.missing_message(),
            format!("TypeScript execution requires ts-node to be installed (tried `{MISSING}`)")
        );
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn marker_in_output_counts_as_missing_component() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let chain = toolchain("sh");
        let script = "echo 'sh: 1: ts-node: not found' >&2; exit 127";

        let ws = tools.stage("script", "ts", "let x = 1;").unwrap();
        let check = check_with_tool(&tools, &chain, &ws, sh(script), no_diagnostics)
            .await
            .unwrap();
        assert!(check.is_valid());

        let result = execute_with_tool(&tools, &chain, sh(script)).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(chain.missing_message()));
        assert!(result.stderr.is_empty());

        drop(ws);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn slow_checker_means_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let ws = tools.stage("script", "ts", "let x = 1;").unwrap();

        let spec = sh("sleep 10").timeout(Duration::from_millis(200));
        let check = check_with_tool(&tools, &toolchain("sh"), &ws, spec, no_diagnostics)
            .await
            .unwrap();

        assert!(!check.is_valid());
        assert_eq!(check.messages(), vec!["Syntax check timed out after 200 ms".to_string()]);
        drop(ws);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn failed_checker_without_diagnostics_reports_raw_output() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let ws = tools.stage("script", "ts", "let x = 1;").unwrap();

        let spec = RunSpec::new("sh")
            .arg("-c")
            .arg("echo \"broken in $0\" >&2; exit 2")
            .arg(ws.file());
        let check = check_with_tool(&tools, &toolchain("sh"), &ws, spec, no_diagnostics)
            .await
            .unwrap();

        assert!(!check.is_valid());
        assert_eq!(check.messages(), vec!["broken in script.ts".to_string()]);
    }

    #[tokio::test]
    async fn execution_output_is_passed_through_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());
        let ws = tools.stage("script", "ts", "let x = 1;").unwrap();

        let spec = RunSpec::new("sh")
            .arg("-c")
            .arg("echo \"$0\"; pwd >&2")
            .arg(ws.file())
            .current_dir(ws.dir());
        let result = execute_with_tool(&tools, &toolchain("sh"), spec).await;

        assert!(result.success, "{result:?}");
        assert_eq!(result.stdout, format!("{}\n", ws.file().display()));
        assert!(result.stderr.contains(&*ws.dir().file_name().unwrap().to_string_lossy()));
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_the_programs_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let tools = toolbox(tmp.path());

        let result = execute_with_tool(&tools, &toolchain("sh"), sh("echo out; echo err >&2; exit 4")).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, 4);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.error, None);
    }
}
