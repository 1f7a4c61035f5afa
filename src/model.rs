//! The model capability: given code and a task description, return a
//! best-effort structured critique. The response may be wrong, malformed,
//! or absent; callers treat it as untrusted input and normalize it
//! downstream.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("model response did not contain any text")]
    MissingText,
}

/// How a file is being reviewed: against its diff or in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    Diff,
    Full,
}

impl std::fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewMode::Diff => write!(f, "diff"),
            ReviewMode::Full => write!(f, "full_file"),
        }
    }
}

#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// Request a free-text critique of the given code.
    async fn critique(
        &self,
        text: &str,
        path: &str,
        language: &str,
        mode: ReviewMode,
    ) -> Result<String, ModelError>;
}

/// Build the analysis prompt. Diff mode instructs the model to report only
/// on changed lines with diff-relative line numbers; full mode requests
/// comprehensive coverage.
pub fn build_prompt(text: &str, path: &str, language: &str, mode: ReviewMode) -> String {
    let schema = r#"Respond with a JSON object of the form:
{"issues": [{"type": "style|bug|performance|security", "line": <number>, "description": "...", "suggestion": "...", "severity": "low|medium|high|critical"}]}"#;

    match mode {
        ReviewMode::Diff => format!(
            "Analyze the following code changes (diff) for issues.\n\n\
             File: {path}\nLanguage: {language}\n\n\
             ```diff\n{text}\n```\n\n\
             Focus ONLY on the changed lines (+ additions, - deletions); \
             ignore unchanged context lines unless they are directly related \
             to the changes. Check the new code for style, bug, performance, \
             and security issues. For each issue report the approximate line \
             number in the diff, counting every non-header line of the diff \
             in order.\n\n{schema}"
        ),
        ReviewMode::Full => format!(
            "Analyze the following {language} code file for issues.\n\n\
             File: {path}\n\n\
             ```{language}\n{text}\n```\n\n\
             Perform a comprehensive review covering code style and \
             formatting, potential bugs and errors, performance, and \
             security vulnerabilities. Report specific line numbers and \
             actionable suggestions.\n\n{schema}"
        ),
    }
}

/// Gemini-backed model capability using the generateContent REST API.
pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiModel {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ModelCapability for GeminiModel {
    async fn critique(
        &self,
        text: &str,
        path: &str,
        language: &str,
        mode: ReviewMode,
    ) -> Result<String, ModelError> {
        let prompt = build_prompt(text, path, language, mode);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": 0.1}
        });

        debug!(model = %self.model, %mode, path, "requesting model critique");
        let response: Value = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.pointer("/content/parts/0/text"))
            .and_then(Value::as_str)
            .ok_or(ModelError::MissingText)?;

        debug!(reply_bytes = reply.len(), "received model critique");
        Ok(reply.to_string())
    }
}

/// Model capability that always returns an empty critique. Used when no
/// API key is configured, so reviews still run on detector findings alone.
pub struct NoopModel;

#[async_trait]
impl ModelCapability for NoopModel {
    async fn critique(
        &self,
        _text: &str,
        _path: &str,
        _language: &str,
        _mode: ReviewMode,
    ) -> Result<String, ModelError> {
        Ok(String::new())
    }
}
