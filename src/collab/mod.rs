// src/collab/mod.rs

//! External collaborators: a reviewer that critiques code and a generator
//! that writes it from a prompt.
//!
//! Both are opaque services. The orchestrator only depends on these traits;
//! [`http::HttpCollaborator`] is the one concrete implementation.

use anyhow::Result;
use async_trait::async_trait;

use crate::engine::AiReview;
use crate::language::Language;

pub mod http;

pub use http::HttpCollaborator;

#[async_trait]
pub trait CodeReviewer: Send + Sync {
    async fn review(&self, code: &str, language: Language) -> Result<AiReview>;
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Produce source code in `language` satisfying `prompt`.
    async fn generate(&self, language: Language, prompt: &str) -> Result<String>;
}
