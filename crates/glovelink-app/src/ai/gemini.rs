//! Gemini REST client
//!
//! Calls `models/{model}:generateContent` and returns the first text part of
//! the reply. HTTP 400 maps to [`ServiceError::BadRequest`]; every other
//! failure (transport, status, empty reply) to
//! [`ServiceError::ServiceUnavailable`].

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use glovelink_core::prelude::*;
use glovelink_core::LogEntry;

use super::{ServiceError, ServiceResult, Summarizer, Translator};
use crate::config::AiSettings;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini HTTP API client
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Build a client from settings, reading the key from `api_key_env`
    pub fn from_settings(settings: &AiSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "AI features need an API key in ${}",
                    settings.api_key_env
                ))
            })?;
        Ok(Self::new(api_key, settings.model.clone()))
    }

    /// Point the client at another endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: String) -> ServiceResult<String> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!("Gemini request to model {}", self.model);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ServiceUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ServiceUnavailable(format!("unreadable response: {e}")))?;

        extract_text(parsed)
    }
}

impl Translator for GeminiClient {
    async fn translate(&self, text: &str, target_language: &str) -> ServiceResult<String> {
        self.generate(translation_prompt(text, target_language)).await
    }
}

impl Summarizer for GeminiClient {
    async fn summarize(&self, entries: &[LogEntry]) -> ServiceResult<String> {
        self.generate(summary_prompt(entries)).await
    }
}

fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following text into the language with ISO 639-1 code \"{target_language}\". \
         Reply with the translation only.\n\n{text}"
    )
}

fn summary_prompt(entries: &[LogEntry]) -> String {
    let transcript: Vec<String> = entries.iter().map(LogEntry::display_line).collect();
    format!(
        "Below is a day's message log between a host and an assistive glove. \
         Lines marked '>' were sent to the glove, lines marked '<' came from it. \
         Summarize the activity in a few sentences.\n\n{}",
        transcript.join("\n")
    )
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> ServiceResult<String> {
    response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.text))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ServiceError::ServiceUnavailable("response contained no text".into()))
}

fn map_http_error(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .and_then(|wrapper| {
            let msg = wrapper.error.message?;
            Some(match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{status_text}: {msg}"),
                _ => msg,
            })
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    if status == StatusCode::BAD_REQUEST {
        ServiceError::BadRequest(message)
    } else {
        ServiceError::ServiceUnavailable(message)
    }
}
