// src/lib.rs

//! polyexec
//!
//! Syntax checking and bounded execution of untrusted source code in
//! Python, TypeScript, C# and Go.
//!
//! Layering, bottom up:
//! - `workspace` / `process`: scratch directories and supervised children
//! - `backends`: one per language, plus the registry that resolves them
//! - `engine`: result shapes and the validate-and-execute orchestrator
//! - `collab`: optional review and generation services

pub mod backends;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution_id;
pub mod language;
pub mod metrics;
pub mod process;
pub mod workspace;

pub use backends::{Backend, BackendRegistry};
pub use config::Config;
pub use engine::{ExecutionResult, Orchestrator, SyntaxCheck, ValidationResponse};
pub use error::UnsupportedLanguage;
pub use language::Language;
