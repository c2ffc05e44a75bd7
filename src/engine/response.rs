// src/engine/response.rs

use serde::{Deserialize, Serialize};

use crate::engine::{Diagnostic, ExecutionResult};
use crate::execution_id::ExecutionId;
use crate::language::Language;

/// A syntax error as reported to the caller. `line` is always 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxError {
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
}

impl SyntaxError {
    /// Diagnostics without a line number fall back to their 1-based position
    /// in the checker's output.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Vec<SyntaxError> {
        diagnostics
            .into_iter()
            .enumerate()
            .map(|(idx, d)| SyntaxError {
                line: d.line.unwrap_or(idx as u32 + 1),
                column: d.column,
                message: d.message,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Excellent,
    Good,
    Fair,
    Poor,
}

/// Qualitative critique produced by the review collaborator.
///
/// Aggregated into the response as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiReview {
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub security_concerns: Vec<String>,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl AiReview {
    /// Stand-in used when the reviewer fails, so the response keeps its shape.
    pub fn unavailable() -> Self {
        Self {
            issues: vec!["AI validation temporarily unavailable".to_string()],
            suggestions: Vec::new(),
            security_concerns: Vec::new(),
            rating: Rating::Fair,
            explanation: Some("Could not complete AI validation".to_string()),
        }
    }
}

/// Aggregate returned by `Orchestrator::validate_and_execute`.
///
/// `execution_result` is present iff `syntax_valid`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub execution_id: ExecutionId,
    pub language: Language,
    pub syntax_valid: bool,
    pub syntax_errors: Vec<SyntaxError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_validation: Option<AiReview>,
}

impl ValidationResponse {
    /// True when the code parsed and ran successfully.
    pub fn passed(&self) -> bool {
        self.syntax_valid
            && self
                .execution_result
                .as_ref()
                .map(|r| r.success)
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn line_numbers_fall_back_to_position() {
        let errors = SyntaxError::from_diagnostics(vec![
            Diagnostic::new("first"),
            Diagnostic::at(7, Some(3), "second"),
            Diagnostic::new("third"),
        ]);
        assert_eq!(
            errors,
            vec![
                SyntaxError { line: 1, column: None, message: "first".into() },
                SyntaxError { line: 7, column: Some(3), message: "second".into() },
                SyntaxError { line: 3, column: None, message: "third".into() },
            ]
        );
    }

    #[test]
    fn review_parses_camel_case_payload() {
        let review: AiReview = serde_json::from_str(
            r#"{"issues":["x"],"suggestions":[],"securityConcerns":["eval"],"rating":"good"}"#,
        )
        .unwrap();
        assert_eq!(review.rating, Rating::Good);
        assert_eq!(review.security_concerns, vec!["eval".to_string()]);
        assert!(review.explanation.is_none());
    }

    #[test]
    fn unavailable_review_is_fair_with_note() {
        let review = AiReview::unavailable();
        assert_eq!(review.rating, Rating::Fair);
        assert!(review.explanation.is_some());
        assert!(!review.issues.is_empty());
    }
}
