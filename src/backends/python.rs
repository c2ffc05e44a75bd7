// src/backends/python.rs

//! Python: interpreted, run directly by the interpreter.
//!
//! The syntax check compiles the source with `compile()` in a throwaway
//! interpreter. Unlike `py_compile` this writes no bytecode, and the checker
//! prints one `line:column:message` record per error, so no traceback
//! scraping is needed.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::backends::{check_with_tool, execute_with_tool, Backend, Toolbox, Toolchain};
use crate::engine::{Diagnostic, ExecutionResult, SyntaxCheck};
use crate::language::Language;
use crate::process::{Captured, RunSpec};

const SCRIPT_STEM: &str = "script";

const CHECKER: &str = r#"
import sys, warnings
warnings.simplefilter("ignore")
path = sys.argv[1]
name = sys.argv[2]
with open(path, encoding="utf-8") as f:
    source = f.read()
try:
    compile(source, name, "exec")
except SyntaxError as e:
    sys.stderr.write("%d:%d:%s\n" % (e.lineno or 0, e.offset or 0, e.msg))
    sys.exit(1)
except ValueError as e:
    sys.stderr.write("0:0:%s\n" % e)
    sys.exit(1)
"#;

pub struct PythonBackend {
    tools: Arc<Toolbox>,
    toolchain: Toolchain,
}

impl PythonBackend {
    pub fn new(tools: Arc<Toolbox>, interpreter: impl Into<String>) -> Self {
        Self {
            tools,
            toolchain: Toolchain {
                language: Language::Python,
                name: "Python 3",
                program: interpreter.into(),
                missing_markers: &[],
            },
        }
    }
}

#[async_trait]
impl Backend for PythonBackend {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn validate_syntax(&self, code: &str) -> Result<SyntaxCheck> {
        let ws = self
            .tools
            .stage(SCRIPT_STEM, Language::Python.extension(), code)?;

        let spec = RunSpec::new(&self.toolchain.program)
            .arg("-I")
            .arg("-c")
            .arg(CHECKER)
            .arg(ws.file())
            .arg(ws.file_name())
            .current_dir(ws.dir());

        check_with_tool(&self.tools, &self.toolchain, &ws, spec, parse_checker_output).await
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let ws = self
            .tools
            .stage(SCRIPT_STEM, Language::Python.extension(), code)?;

        let spec = RunSpec::new(&self.toolchain.program)
            .arg(ws.file())
            .current_dir(ws.dir())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1");

        Ok(execute_with_tool(&self.tools, &self.toolchain, spec).await)
    }
}

/// Parse `line:column:message` records written by the checker.
fn parse_checker_output(out: &Captured) -> Vec<Diagnostic> {
    super::non_empty_lines(&out.stderr)
        .map(|line| {
            let mut parts = line.splitn(3, ':');
            let row = parts.next().and_then(|s| s.parse::<u32>().ok());
            let col = parts.next().and_then(|s| s.parse::<u32>().ok());
            match (row, col, parts.next()) {
                (Some(row), col, Some(msg)) if row > 0 => {
                    Diagnostic::at(row, col.filter(|c| *c > 0), msg.trim())
                }
                (Some(_), _, Some(msg)) => Diagnostic::new(msg.trim()),
                _ => Diagnostic::new(line.trim()),
            }
        })
        .collect()
}
