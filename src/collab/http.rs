// src/collab/http.rs

//! JSON-over-HTTP collaborator.
//!
//! - `POST {url}/review`   `{code, language}` -> `AiReview`
//! - `POST {url}/generate` `{language, prompt}` -> `{code}`
//!
//! An API key, when configured, is sent as a bearer token.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::collab::{CodeGenerator, CodeReviewer};
use crate::config::CollaboratorConfig;
use crate::engine::AiReview;
use crate::language::Language;

#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ReviewRequest<'a> {
    code: &'a str,
    language: Language,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    language: Language,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    code: String,
}

impl HttpCollaborator {
    pub fn new(config: &CollaboratorConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            headers: headers(config.api_key.as_deref())?,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path);
        let resp = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to call collaborator {url}"))?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            bail!("Collaborator {} failed: {} {}", path, status, text);
        }

        serde_json::from_str(&text)
            .with_context(|| format!("Collaborator {path} returned invalid JSON"))
    }
}

#[async_trait]
impl CodeReviewer for HttpCollaborator {
    async fn review(&self, code: &str, language: Language) -> Result<AiReview> {
        self.post("review", &ReviewRequest { code, language }).await
    }
}

#[async_trait]
impl CodeGenerator for HttpCollaborator {
    async fn generate(&self, language: Language, prompt: &str) -> Result<String> {
        let out: GenerateResponse = self
            .post("generate", &GenerateRequest { language, prompt })
            .await?;

        let code = strip_code_fence(&out.code);
        if code.trim().is_empty() {
            bail!("Collaborator returned no code");
        }
        Ok(code)
    }
}

fn headers(api_key: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(key) = api_key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .context("Invalid collaborator API key for Authorization header")?,
        );
    }
    Ok(headers)
}

/// Generators often wrap code in a markdown fence; keep only the body.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };

    // Drop the info string (```python) and the closing fence.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fenced_code_is_unwrapped() {
        let text = "```python\nprint('hi')\n```\n";
        assert_eq!(strip_code_fence(text), "print('hi')");
    }

    #[test]
    fn plain_code_is_untouched() {
        assert_eq!(strip_code_fence("print(1)\n"), "print(1)\n");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = HttpCollaborator::new(&CollaboratorConfig {
            url: "http://localhost:8787/".to_string(),
            api_key: Some("k".to_string()),
            timeout_ms: 1000,
        })
        .unwrap();
        assert_eq!(c.endpoint("review"), "http://localhost:8787/review");
        assert_eq!(c.headers[AUTHORIZATION], "Bearer k");
    }

    #[test]
    fn request_bodies_use_language_ids() {
        let body = serde_json::to_value(ReviewRequest {
            code: "x",
            language: Language::CSharp,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"code": "x", "language": "csharp"}));
    }
}
