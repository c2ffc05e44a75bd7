// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// Timeout applied to every syntax-check sub-call.
///
/// Syntax checks sit on the interactive path, so this is deliberately shorter
/// than the execution timeout and not user-configurable.
pub const SYNTAX_CHECK_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Root configuration.
///
/// Built once at process start (optional YAML file, then environment
/// overrides) and handed by reference to the process runner and backends.
///
/// Example `polyexec.yaml`:
///
/// execution_timeout_ms: 10000
/// max_output_bytes: 10000
/// runtime:
///   python: python3
///   go: go
/// collaborator:
///   url: http://localhost:8787
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock budget for one `Execute` call, in milliseconds.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    /// Combined stdout+stderr capture cap, in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Directory under which per-invocation workspaces are created.
    ///
    /// Defaults to the OS temp directory.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,

    /// Toolchain binaries.
    #[serde(default)]
    pub runtime: Runtime,

    /// Target framework written into the throwaway C# project used for
    /// syntax checks.
    #[serde(default = "default_csharp_target_framework")]
    pub csharp_target_framework: String,

    /// Optional code-generation / review service.
    #[serde(default)]
    pub collaborator: Option<CollaboratorConfig>,
}

/// Toolchain binary names (or absolute paths).
#[derive(Debug, Clone, Deserialize)]
pub struct Runtime {
    #[serde(default = "default_python")]
    pub python: String,

    #[serde(default = "default_go")]
    pub go: String,

    #[serde(default = "default_gofmt")]
    pub gofmt: String,

    #[serde(default = "default_dotnet")]
    pub dotnet: String,

    #[serde(default = "default_npx")]
    pub npx: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            python: default_python(),
            go: default_go(),
            gofmt: default_gofmt(),
            dotnet: default_dotnet(),
            npx: default_npx(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    /// Base URL; `/review` and `/generate` are appended.
    pub url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_collaborator_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_execution_timeout_ms() -> u64 {
    10_000
}

fn default_max_output_bytes() -> usize {
    10_000
}

fn default_csharp_target_framework() -> String {
    "net8.0".to_string()
}

fn default_collaborator_timeout_ms() -> u64 {
    30_000
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_go() -> String {
    "go".to_string()
}

fn default_gofmt() -> String {
    "gofmt".to_string()
}

fn default_dotnet() -> String {
    "dotnet".to_string()
}

fn default_npx() -> String {
    "npx".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution_timeout_ms: default_execution_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            workspace_dir: None,
            runtime: Runtime::default(),
            csharp_target_framework: default_csharp_target_framework(),
            collaborator: None,
        }
    }
}

impl Config {
    /// Load and parse a YAML config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let cfg: Config = serde_yaml::from_str(&raw).context("Failed to parse YAML config")?;

        Ok(cfg)
    }

    /// File config (if any) overlaid with the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply environment overrides.
    ///
    /// Takes a lookup function so tests don't have to mutate the real
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EXECUTION_TIMEOUT") {
            self.execution_timeout_ms = v
                .trim()
                .parse()
                .with_context(|| format!("EXECUTION_TIMEOUT is not a number of milliseconds: {v:?}"))?;
        }

        if let Some(v) = lookup("MAX_OUTPUT_SIZE") {
            self.max_output_bytes = v
                .trim()
                .parse()
                .with_context(|| format!("MAX_OUTPUT_SIZE is not a number of bytes: {v:?}"))?;
        }

        if let Some(v) = lookup("POLYEXEC_WORKSPACE_DIR") {
            self.workspace_dir = Some(PathBuf::from(v));
        }

        if let Some(url) = lookup("POLYEXEC_COLLABORATOR_URL") {
            let timeout_ms = self
                .collaborator
                .as_ref()
                .map(|c| c.timeout_ms)
                .unwrap_or_else(default_collaborator_timeout_ms);
            let api_key = self.collaborator.as_ref().and_then(|c| c.api_key.clone());
            self.collaborator = Some(CollaboratorConfig {
                url,
                api_key,
                timeout_ms,
            });
        }

        if let Some(key) = lookup("POLYEXEC_COLLABORATOR_KEY") {
            if let Some(c) = self.collaborator.as_mut() {
                c.api_key = Some(key);
            }
        }

        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
