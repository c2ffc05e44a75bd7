// src/workspace.rs

//! Per-invocation scratch space.
//!
//! Every `ValidateSyntax` / `Execute` call acquires its own `Workspace`: a
//! uniquely named directory under the configured root holding exactly one
//! source file. Toolchain litter (`__pycache__`, `obj/`, `bin/`) lands in the
//! same directory, so removing the directory removes everything the call
//! produced.
//!
//! Release is tied to `Drop`, which means no call site can return (or unwind)
//! without cleaning up. `release()` exists for callers that want to observe
//! the removal error; it is idempotent.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;

/// Hands out uniquely named workspaces under a root directory.
#[derive(Debug)]
pub struct WorkspaceManager {
    root: PathBuf,
    salt: u32,
    counter: AtomicU64,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            salt: std::process::id(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh workspace whose source file is `<stem>.<extension>`.
    ///
    /// The directory name combines a microsecond timestamp, the process id
    /// and a per-manager counter, and `tempfile` appends random characters on
    /// top, so concurrent acquisitions never collide.
    pub fn acquire(&self, stem: &str, extension: &str) -> Result<Workspace> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create workspace root {:?}", self.root))?;

        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let prefix = format!(
            "polyexec-{}-{}-{}-",
            chrono::Utc::now().format("%Y%m%d%H%M%S%6f"),
            self.salt,
            seq
        );

        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.root)
            .with_context(|| format!("Failed to create workspace under {:?}", self.root))?;

        let dir_path = dir.path().to_path_buf();
        let file = dir_path.join(format!("{stem}.{extension}"));

        tracing::debug!(workspace = %dir_path.display(), "workspace acquired");

        Ok(Workspace {
            dir: Some(dir),
            dir_path,
            file,
        })
    }
}

/// One invocation's scratch directory and its source file.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    dir_path: PathBuf,
    file: PathBuf,
}

impl Workspace {
    /// Path of the source file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Path of the enclosing directory.
    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    /// File name of the source file, used to scrub absolute paths out of
    /// toolchain diagnostics.
    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Write the source text. The submitted code is copied, never modified.
    pub fn write(&self, content: &str) -> Result<()> {
        self.write_named(&self.file, content)
    }

    /// Write an auxiliary file (e.g. a project manifest) next to the source.
    pub fn write_aux(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir_path.join(name);
        self.write_named(&path, content)?;
        Ok(path)
    }

    fn write_named(&self, path: &Path, content: &str) -> Result<()> {
        if self.dir.is_none() {
            anyhow::bail!("workspace {:?} was already released", self.dir_path);
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write workspace file {:?}", path))
    }

    /// Replace occurrences of the workspace paths in tool output with the
    /// bare file name so diagnostics do not depend on where the workspace
    /// happened to live.
    pub fn scrub(&self, text: &str) -> String {
        let file = self.file.to_string_lossy();
        let dir = self.dir_path.to_string_lossy();
        text.replace(file.as_ref(), &self.file_name())
            .replace(&format!("{dir}/"), "")
            .replace(dir.as_ref(), ".")
    }

    /// Delete the workspace. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                dir.close()
                    .with_context(|| format!("Failed to remove workspace {:?}", self.dir_path))?;
                tracing::debug!(workspace = %self.dir_path.display(), "workspace released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "workspace cleanup failed");
        }
    }
}
