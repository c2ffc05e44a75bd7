// src/backends/csharp.rs

//! C#: checked with a throwaway MSBuild project, executed by `dotnet script`.
//!
//! `dotnet build` needs a project file, so the syntax check writes a minimal
//! one next to the source. Build output (`obj/`, `bin/`) stays inside the
//! workspace and goes away with it.
//!
//! Errors whose code starts with `NETSDK`, `MSB` or `NU` describe the SDK
//! install or package restore rather than the submitted code; they are
//! treated like a missing toolchain.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::backends::{check_with_tool, execute_with_tool, Backend, Toolbox, Toolchain};
use crate::engine::{Diagnostic, ExecutionResult, SyntaxCheck};
use crate::language::Language;
use crate::process::{Captured, RunSpec};

const PROGRAM_STEM: &str = "Program";
const SCRIPT_EXTENSION: &str = "csx";
const PROJECT_FILE: &str = "Check.csproj";

pub struct CSharpBackend {
    tools: Arc<Toolbox>,
    toolchain: Toolchain,
    target_framework: String,
}

impl CSharpBackend {
    pub fn new(
        tools: Arc<Toolbox>,
        dotnet: impl Into<String>,
        target_framework: impl Into<String>,
    ) -> Self {
        Self {
            tools,
            toolchain: Toolchain {
                language: Language::CSharp,
                name: ".NET SDK",
                program: dotnet.into(),
                missing_markers: &[
                    "Could not execute because the specified command or file was not found",
                    "No executable found matching command \"dotnet-script\"",
                    "The application 'script' does not exist",
                ],
            },
            target_framework: target_framework.into(),
        }
    }

    fn project_file(&self) -> String {
        format!(
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>{}</TargetFramework>
    <ImplicitUsings>enable</ImplicitUsings>
    <EnableDefaultCompileItems>false</EnableDefaultCompileItems>
    <UseAppHost>false</UseAppHost>
  </PropertyGroup>
  <ItemGroup>
    <Compile Include="{}.{}" />
  </ItemGroup>
</Project>
"#,
            self.target_framework,
            PROGRAM_STEM,
            Language::CSharp.extension()
        )
    }

    fn dotnet(&self) -> RunSpec {
        RunSpec::new(&self.toolchain.program)
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1")
            .env("DOTNET_NOLOGO", "1")
            .env("DOTNET_SKIP_FIRST_TIME_EXPERIENCE", "1")
    }
}

#[async_trait]
impl Backend for CSharpBackend {
    fn language(&self) -> Language {
        Language::CSharp
    }

    async fn validate_syntax(&self, code: &str) -> Result<SyntaxCheck> {
        let ws = self
            .tools
            .stage(PROGRAM_STEM, Language::CSharp.extension(), code)?;
        let project = ws.write_aux(PROJECT_FILE, &self.project_file())?;

        let spec = self
            .dotnet()
            .arg("build")
            .arg(&project)
            .args(["--nologo", "-v:q", "-clp:NoSummary"])
            .current_dir(ws.dir());

        let check = check_with_tool(&self.tools, &self.toolchain, &ws, spec, parse_msbuild_errors).await?;

        if check.errors().iter().any(is_sdk_problem) {
            tracing::warn!(
                errors = ?check.messages(),
                "dotnet build failed for reasons outside the submitted code; treating code as valid"
            );
            return Ok(SyntaxCheck::ok());
        }
        Ok(check)
    }

    async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        let ws = self.tools.stage(PROGRAM_STEM, SCRIPT_EXTENSION, code)?;

        let spec = self.dotnet().arg("script").arg(ws.file()).current_dir(ws.dir());

        Ok(execute_with_tool(&self.tools, &self.toolchain, spec).await)
    }
}

fn msbuild_error() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<file>[^(]*)\((?P<line>\d+),(?P<col>\d+)\)|[^:]*):\s*error\s+(?P<code>[A-Za-z]+\d+):\s*(?P<msg>.*?)(?:\s+\[[^\]]*\])?$",
        )
        .expect("static regex is valid")
    })
}

/// Parse MSBuild `error CSxxxx` lines. MSBuild reports on stdout and may
/// repeat an error; duplicates are dropped while order is kept.
fn parse_msbuild_errors(out: &Captured) -> Vec<Diagnostic> {
    let mut found: Vec<Diagnostic> = Vec::new();

    for line in super::non_empty_lines(&out.stdout).chain(super::non_empty_lines(&out.stderr)) {
        let Some(c) = msbuild_error().captures(line.trim()) else {
            continue;
        };

        let message = format!("{}: {}", &c["code"], &c["msg"]);
        let diag = match c.name("line").and_then(|l| l.as_str().parse::<u32>().ok()) {
            Some(row) => Diagnostic::at(
                row,
                c.name("col").and_then(|m| m.as_str().parse().ok()),
                message,
            ),
            None => Diagnostic::new(message),
        };

        if !found.contains(&diag) {
            found.push(diag);
        }
    }

    found
}

fn is_sdk_problem(diag: &Diagnostic) -> bool {
    ["NETSDK", "MSB", "NU"]
        .iter()
        .any(|prefix| diag.message.starts_with(prefix))
}
