// src/engine/run.rs

//! Validate-and-execute pipeline.
//!
//! Flow for one request:
//! - resolve the backend (the only request-fatal step)
//! - syntax check
//! - review, concurrently with execution when the syntax is valid
//! - aggregate into a `ValidationResponse`
//!
//! Backend faults and reviewer failures never escape; they degrade into
//! fields of the response.

use std::sync::Arc;
use tracing::Instrument;

use crate::backends::{Backend, BackendRegistry};
use crate::collab::CodeReviewer;
use crate::engine::{AiReview, ExecutionResult, SyntaxCheck, SyntaxError, ValidationResponse};
use crate::error::UnsupportedLanguage;
use crate::execution_id::ExecutionId;
use crate::language::Language;

#[derive(Clone)]
pub struct Orchestrator {
    registry: BackendRegistry,
    reviewer: Option<Arc<dyn CodeReviewer>>,
}

impl Orchestrator {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            reviewer: None,
        }
    }

    pub fn with_reviewer(mut self, reviewer: Arc<dyn CodeReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub async fn validate_and_execute(
        &self,
        language: &str,
        code: &str,
    ) -> Result<ValidationResponse, UnsupportedLanguage> {
        let backend = self.registry.resolve(language)?;
        let lang = backend.language();
        let execution_id = ExecutionId::new();

        let span = tracing::info_span!(
            "validate_and_execute",
            execution_id = %execution_id,
            language = %lang
        );

        async move {
            let check = checked(backend.as_ref(), code).await;
            let syntax_valid = check.is_valid();

            if !syntax_valid {
                tracing::info!(errors = check.errors().len(), "syntax invalid; skipping execution");
            }

            let run = async {
                if syntax_valid {
                    Some(executed(backend.as_ref(), code).await)
                } else {
                    None
                }
            };
            let (execution, review) = tokio::join!(run, self.reviewed(code, lang));

            if let Some(exec) = &execution {
                tracing::info!(
                    success = exec.success,
                    exit_code = exec.exit_code,
                    duration_ms = exec.duration_ms,
                    "execution finished"
                );
            }

            Ok(ValidationResponse {
                execution_id,
                language: lang,
                syntax_valid,
                syntax_errors: SyntaxError::from_diagnostics(check.into_errors()),
                execution_result: execution,
                ai_validation: review,
            })
        }
        .instrument(span)
        .await
    }

    /// Syntax check only; no execution, no review.
    pub async fn check_syntax(
        &self,
        language: &str,
        code: &str,
    ) -> Result<(Language, SyntaxCheck), UnsupportedLanguage> {
        let backend = self.registry.resolve(language)?;
        let check = checked(backend.as_ref(), code).await;
        Ok((backend.language(), check))
    }

    async fn reviewed(&self, code: &str, language: Language) -> Option<AiReview> {
        let reviewer = self.reviewer.as_ref()?;
        match reviewer.review(code, language).await {
            Ok(review) => Some(review),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "code review failed");
                Some(AiReview::unavailable())
            }
        }
    }
}

async fn checked(backend: &dyn Backend, code: &str) -> SyntaxCheck {
    match backend.validate_syntax(code).await {
        Ok(check) => check,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "syntax check failed to run");
            SyntaxCheck::invalid(format!("Syntax validation error: {e}"))
        }
    }
}

async fn executed(backend: &dyn Backend, code: &str) -> ExecutionResult {
    match backend.execute(code).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "execution failed to run");
            ExecutionResult::fault(format!("Execution error: {e}"))
        }
    }
}
