// src/runner.rs

use polyexec::backends::BackendRegistry;
use polyexec::collab::{CodeGenerator, HttpCollaborator};
use polyexec::config::Config;
use polyexec::engine::{AiReview, ExecutionResult, Orchestrator, SyntaxError, ValidationResponse};
use polyexec::language::Language;

use crate::cli::{Cli, Command, Input, OutputMode, Source};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::Arc;

/// Entry point from `main.rs`.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Languages => {
            print!("{}", format_languages());
            Ok(())
        }

        Command::Validate { source, output } => {
            let cfg = Config::resolve(cli.config.as_deref())?;
            let collaborator = collaborator(&cfg)?;
            let code = load_code(&source, collaborator.as_ref()).await?;

            let mut orch = Orchestrator::new(BackendRegistry::from_config(&cfg));
            if let Some(c) = collaborator {
                orch = orch.with_reviewer(c);
            }

            let resp = orch.validate_and_execute(&source.language, &code).await?;
            println!("{}", render(output, &resp, |r| format_validation(r, should_use_color()))?);

            if !resp.passed() {
                bail!("Validation failed");
            }
            Ok(())
        }

        Command::Check { source, output } => {
            let cfg = Config::resolve(cli.config.as_deref())?;
            let collaborator = collaborator(&cfg)?;
            let code = load_code(&source, collaborator.as_ref()).await?;

            let orch = Orchestrator::new(BackendRegistry::from_config(&cfg));
            let (language, check) = orch.check_syntax(&source.language, &code).await?;

            let report = CheckReport {
                language,
                syntax_valid: check.is_valid(),
                syntax_errors: SyntaxError::from_diagnostics(check.into_errors()),
            };
            println!("{}", render(output, &report, |r| format_check(r, should_use_color()))?);

            if !report.syntax_valid {
                bail!("Syntax check failed");
            }
            Ok(())
        }
    }
}

/* ---------------- input ---------------- */

fn collaborator(cfg: &Config) -> Result<Option<Arc<HttpCollaborator>>> {
    cfg.collaborator
        .as_ref()
        .map(|c| HttpCollaborator::new(c).map(Arc::new))
        .transpose()
}

async fn load_code(source: &Source, generator: Option<&Arc<HttpCollaborator>>) -> Result<String> {
    let code = match &source.input {
        Input { file: Some(path), .. } => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file {:?}", path))?,

        Input { code: Some(code), .. } => code.clone(),

        Input { prompt: Some(prompt), .. } => {
            let Some(generator) = generator else {
                bail!("--prompt needs a collaborator (set POLYEXEC_COLLABORATOR_URL or `collaborator.url`)");
            };
            let language: Language = source.language.parse()?;
            let code = generator
                .generate(language, prompt)
                .await
                .context("Code generation failed")?;
            tracing::info!(bytes = code.len(), "generated code");
            code
        }

        Input { .. } => bail!("One of --file, --code or --prompt is required"),
    };

    if code.trim().is_empty() {
        bail!("Code cannot be empty");
    }
    Ok(code)
}

/* ---------------- output ---------------- */

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    language: Language,
    syntax_valid: bool,
    syntax_errors: Vec<SyntaxError>,
}

fn render<T, F>(mode: OutputMode, value: &T, simple: F) -> Result<String>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match mode {
        OutputMode::Json => serde_json::to_string(value).context("Failed to format output as JSON"),
        OutputMode::Pretty => {
            serde_json::to_string_pretty(value).context("Failed to format output as pretty JSON")
        }
        OutputMode::Simple => Ok(simple(value)),
    }
}

fn format_languages() -> String {
    let mut out = String::new();
    for lang in Language::ALL {
        out.push_str(&format!(
            "{:<12} {:<12} .{:<4} {}\n",
            lang.id(),
            lang.display_name(),
            lang.extension(),
            lang.mime_type()
        ));
    }
    out
}

fn format_validation(resp: &ValidationResponse, use_color: bool) -> String {
    let ok = resp.passed();
    let status = paint(if ok { "OK" } else { "FAIL" }, if ok { "32" } else { "31" }, use_color);

    let mut out = String::new();
    out.push_str(&format!("{} {} {}\n", status, resp.language, resp.execution_id));

    if resp.syntax_valid {
        out.push_str("syntax: valid\n");
    } else {
        out.push_str("syntax: invalid\n");
        push_syntax_errors(&mut out, &resp.syntax_errors);
    }

    if let Some(exec) = &resp.execution_result {
        push_execution(&mut out, exec);
    }
    if let Some(review) = &resp.ai_validation {
        push_review(&mut out, review);
    }

    out.trim_end().to_string()
}

fn format_check(report: &CheckReport, use_color: bool) -> String {
    let ok = report.syntax_valid;
    let status = paint(if ok { "OK" } else { "FAIL" }, if ok { "32" } else { "31" }, use_color);

    let mut out = format!("{} {}\n", status, report.language);
    push_syntax_errors(&mut out, &report.syntax_errors);
    out.trim_end().to_string()
}

fn push_syntax_errors(out: &mut String, errors: &[SyntaxError]) {
    for e in errors {
        match e.column {
            Some(col) => out.push_str(&format!("- line {}:{}: {}\n", e.line, col, e.message)),
            None => out.push_str(&format!("- line {}: {}\n", e.line, e.message)),
        }
    }
}

fn push_execution(out: &mut String, exec: &ExecutionResult) {
    let time = exec
        .duration_ms
        .map(|v| format!("{}ms", v))
        .unwrap_or_else(|| "n/a".to_string());
    let mem = exec
        .peak_memory_kb
        .map(|v| format!("{}kb", v))
        .unwrap_or_else(|| "n/a".to_string());

    out.push_str(&format!("exit: {}\n", exec.exit_code));
    out.push_str(&format!("time: {}\n", time));
    out.push_str(&format!("memory: {}\n", mem));

    if let Some(err) = &exec.error {
        out.push_str(&format!("error: {}\n", err));
    }
    for (label, text) in [("stdout", &exec.stdout), ("stderr", &exec.stderr)] {
        if !text.trim().is_empty() {
            out.push_str(&format!("{}:\n{}\n", label, text.trim_end()));
        }
    }
}

fn push_review(out: &mut String, review: &AiReview) {
    let rating = serde_json::to_value(review.rating)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    out.push_str(&format!("review: {}\n", rating));

    for (label, items) in [
        ("issue", &review.issues),
        ("suggestion", &review.suggestions),
        ("security", &review.security_concerns),
    ] {
        for item in items {
            out.push_str(&format!("- {}: {}\n", label, item));
        }
    }
    if let Some(explanation) = &review.explanation {
        out.push_str(&format!("{}\n", explanation));
    }
}

fn should_use_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stdout().is_terminal()
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{}m{}\x1b[0m", color, text)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyexec::engine::Rating;
    use polyexec::execution_id::ExecutionId;
    use pretty_assertions::assert_eq;

    fn response(exec: Option<ExecutionResult>, errors: Vec<SyntaxError>) -> ValidationResponse {
        ValidationResponse {
            execution_id: ExecutionId("exec_test".to_string()),
            language: Language::Python,
            syntax_valid: errors.is_empty(),
            syntax_errors: errors,
            execution_result: exec,
            ai_validation: None,
        }
    }

    #[test]
    fn simple_output_for_invalid_syntax_lists_errors() {
        let resp = response(
            None,
            vec![SyntaxError {
                line: 1,
                column: Some(7),
                message: "invalid syntax".to_string(),
            }],
        );
        assert_eq!(
            format_validation(&resp, false),
            "FAIL python exec_test\nsyntax: invalid\n- line 1:7: invalid syntax"
        );
    }

    #[test]
    fn simple_output_shows_run_details_and_review() {
        let mut resp = response(
            Some(ExecutionResult {
                success: true,
                stdout: "Hello\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
                error: None,
                output_truncated: false,
                duration_ms: Some(42),
                peak_memory_kb: None,
            }),
            Vec::new(),
        );
        resp.ai_validation = Some(AiReview {
            issues: Vec::new(),
            suggestions: vec!["use a main guard".to_string()],
            security_concerns: Vec::new(),
            rating: Rating::Good,
            explanation: None,
        });

        assert_eq!(
            format_validation(&resp, false),
            "OK python exec_test\nsyntax: valid\nexit: 0\ntime: 42ms\nmemory: n/a\nstdout:\nHello\nreview: good\n- suggestion: use a main guard"
        );
    }

    #[test]
    fn json_modes_serialise_the_response() {
        let report = CheckReport {
            language: Language::Go,
            syntax_valid: true,
            syntax_errors: Vec::new(),
        };
        let json = render(OutputMode::Json, &report, |_| String::new()).unwrap();
        assert_eq!(json, r#"{"language":"go","syntaxValid":true,"syntaxErrors":[]}"#);
    }

    #[test]
    fn languages_table_lists_all_four() {
        let table = format_languages();
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("typescript"));
        assert!(table.contains(".cs"));
    }

    #[tokio::test]
    async fn blank_code_is_rejected() {
        let source = Source {
            language: "python".to_string(),
            input: Input {
                file: None,
                code: Some("  \n\t".to_string()),
                prompt: None,
            },
        };
        let err = load_code(&source, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Code cannot be empty");
    }

    #[tokio::test]
    async fn prompt_without_collaborator_is_rejected() {
        let source = Source {
            language: "go".to_string(),
            input: Input {
                file: None,
                code: None,
                prompt: Some("print hello".to_string()),
            },
        };
        assert!(load_code(&source, None).await.is_err());
    }
}
