// src/backends/typescript.rs

//! TypeScript: parsed in-process, executed through `ts-node`.
//!
//! The syntax check runs the `oxc` parser over the source in memory. It never
//! touches the filesystem or spawns a process. Parser errors carry a byte
//! offset, which is mapped back to a 1-based line and column.
//!
//! Execution uses the locally installed `ts-node` via `npx --no-install` so
//! nothing is fetched from the network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::sync::Arc;

use crate::backends::{execute_with_tool, Backend, Toolbox, Toolchain};
use crate::engine::{Diagnostic, ExecutionResult, SyntaxCheck};
use crate::language::Language;
use crate::process::RunSpec;

const SCRIPT_STEM: &str = "script";
const SCRIPT_NAME: &str = "script.ts";

pub struct TypeScriptBackend {
    tools: Arc<Toolbox>,
    toolchain: Toolchain,
}

impl TypeScriptBackend {
    pub fn new(tools: Arc<Toolbox>, npx: impl Into<String>) -> Self {
        Self {
            tools,
            toolchain: Toolchain {
                language: Language::TypeScript,
                name: "ts-node",
                program: npx.into(),
                missing_markers: &[
                    "could not determine executable to run",
                    "ts-node: not found",
                    "command not found: ts-node",
                    "Cannot find module 'typescript'",
                ],
            },
        }
    }
}

#[async_trait]
impl Backend for TypeScriptBackend {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    async fn validate_syntax(&self, code: &str) -> Result<SyntaxCheck> {
        Ok(SyntaxCheck::from_diagnostics(parse_errors(code)?))
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let ws = self
            .tools
            .stage(SCRIPT_STEM, Language::TypeScript.extension(), code)?;

        let spec = RunSpec::new(&self.toolchain.program)
            .args(["--no-install", "ts-node", "--transpile-only"])
            .arg(ws.file())
            .current_dir(ws.dir())
            .env("TS_NODE_COMPILER_OPTIONS", r#"{"module":"commonjs"}"#);

        Ok(execute_with_tool(&self.tools, &self.toolchain, spec).await)
    }
}

/// Parse `code` as a TypeScript module and report every syntax error.
fn parse_errors(code: &str) -> Result<Vec<Diagnostic>> {
    let source_type =
        SourceType::from_path(SCRIPT_NAME).map_err(|e| anyhow!("TypeScript source type: {e:?}"))?;

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, source_type).parse();

    Ok(parsed
        .errors
        .iter()
        .map(|err| {
            let message = err.to_string();
            let offset = err
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map(|label| label.offset());

            match offset {
                Some(offset) => {
                    let (line, column) = position(code, offset);
                    Diagnostic::at(line, Some(column), message)
                }
                None => Diagnostic::new(message),
            }
        })
        .collect())
}

/// 1-based line and column (in characters) of a byte offset.
fn position(source: &str, offset: usize) -> (u32, u32) {
    let mut end = offset.min(source.len());
    while !source.is_char_boundary(end) {
        end -= 1;
    }
    let before = &source[..end];

    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;

    (line as u32, column as u32)
}
