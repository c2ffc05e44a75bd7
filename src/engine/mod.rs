// src/engine/mod.rs

//! Result shapes shared by every backend, plus the orchestrator.
//!
//! Backends never hand raw tool text to callers; they translate into the
//! types below so that a Go compile error and a Python traceback arrive in
//! the same shape.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::process::{Captured, SENTINEL_EXIT_CODE};

pub mod response;
pub mod run;

pub use response::{AiReview, Rating, SyntaxError, ValidationResponse};
pub use run::Orchestrator;

/* ---------------- syntax checking ---------------- */

/// One diagnostic reported by a syntax checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based line, when the tool reports one.
    pub line: Option<u32>,
    /// 1-based column, when the tool reports one.
    pub column: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn at(line: u32, column: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column,
            message: message.into(),
        }
    }
}

/// Outcome of `ValidateSyntax`. `errors` is empty iff `valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxCheck {
    valid: bool,
    errors: Vec<Diagnostic>,
}

impl SyntaxCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Valid iff `errors` is empty.
    pub fn from_diagnostics(errors: Vec<Diagnostic>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// A single-message failure.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::from_diagnostics(vec![Diagnostic::new(message)])
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|d| d.message.clone()).collect()
    }

    pub fn into_errors(self) -> Vec<Diagnostic> {
        self.errors
    }
}

/* ---------------- execution ---------------- */

/// Outcome of `Execute`.
///
/// `success == (exit_code == 0)` whenever the process ran to completion.
/// When `error` is set the call did not complete normally (launch failure,
/// missing toolchain, timeout, truncated output) and `success` is false.
/// `stderr` only ever carries the child's own error stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub output_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_kb: Option<u64>,
}

impl ExecutionResult {
    /// The process ran (zero or nonzero exit).
    pub fn completed(out: Captured) -> Self {
        let error = out
            .truncated
            .then(|| "Output exceeded the configured limit and was truncated".to_string());

        Self {
            success: out.exit_code == 0 && !out.truncated,
            stdout: out.stdout,
            stderr: out.stderr,
            exit_code: out.exit_code,
            error,
            output_truncated: out.truncated,
            duration_ms: Some(out.metrics.duration_ms),
            peak_memory_kb: out.metrics.peak_memory_kb,
        }
    }

    /// The wall-clock budget ran out. Keeps whatever partial output was captured.
    pub fn timed_out(partial: Captured, timeout: Duration) -> Self {
        Self {
            success: false,
            stdout: partial.stdout,
            stderr: partial.stderr,
            exit_code: SENTINEL_EXIT_CODE,
            error: Some(format!(
                "Execution timed out after {} ms",
                timeout.as_millis()
            )),
            output_truncated: partial.truncated,
            duration_ms: Some(partial.metrics.duration_ms),
            peak_memory_kb: partial.metrics.peak_memory_kb,
        }
    }

    /// The process could not be launched or managed at all.
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: SENTINEL_EXIT_CODE,
            error: Some(message.into()),
            output_truncated: false,
            duration_ms: None,
            peak_memory_kb: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InvocationMetrics;

    fn captured(exit_code: i32, truncated: bool) -> Captured {
        Captured {
            stdout: "out".into(),
            stderr: "err".into(),
            exit_code,
            truncated,
            metrics: InvocationMetrics {
                duration_ms: 12,
                peak_memory_kb: None,
            },
        }
    }

    #[test]
    fn success_tracks_exit_code() {
        assert!(ExecutionResult::completed(captured(0, false)).success);

        let failed = ExecutionResult::completed(captured(2, false));
        assert!(!failed.success);
        assert_eq!(failed.exit_code, 2);
        assert_eq!(failed.stderr, "err");
        assert!(failed.error.is_none());
    }

    #[test]
    fn truncation_is_reported_as_failure() {
        let r = ExecutionResult::completed(captured(0, true));
        assert!(!r.success);
        assert!(r.output_truncated);
        assert!(r.error.is_some());
    }

    #[test]
    fn fault_uses_sentinel_and_error() {
        let r = ExecutionResult::fault("boom");
        assert!(!r.success);
        assert_ne!(r.exit_code, 0);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.stderr.is_empty());
    }

    #[test]
    fn timeout_keeps_partial_output() {
        let r = ExecutionResult::timed_out(captured(SENTINEL_EXIT_CODE, false), Duration::from_millis(250));
        assert!(!r.success);
        assert_eq!(r.stdout, "out");
        assert!(r.error.unwrap().contains("250 ms"));
    }

    #[test]
    fn syntax_check_validity_follows_errors() {
        assert!(SyntaxCheck::from_diagnostics(vec![]).is_valid());
        let bad = SyntaxCheck::invalid("unexpected EOF");
        assert!(!bad.is_valid());
        assert_eq!(bad.messages(), vec!["unexpected EOF".to_string()]);
    }

    #[test]
    fn serialises_with_camel_case_and_omits_empty_fields() {
        let json = serde_json::to_value(ExecutionResult::completed(captured(0, false))).unwrap();
        assert_eq!(json["exitCode"], 0);
        assert_eq!(json["durationMs"], 12);
        assert!(json.get("error").is_none());
        assert!(json.get("outputTruncated").is_none());
    }
}
