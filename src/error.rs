// src/error.rs

//! Error taxonomy shared across the crate.
//!
//! Only conditions a caller must branch on get a typed error here.
//! Everything else travels as `anyhow::Error` with context attached.

use thiserror::Error;

/// The requested language identifier does not resolve to a registered backend.
///
/// This is the only request-fatal error the orchestrator returns; every
/// other failure degrades into a field of the response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported language: {identifier}")]
pub struct UnsupportedLanguage {
    identifier: String,
}

impl UnsupportedLanguage {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}
