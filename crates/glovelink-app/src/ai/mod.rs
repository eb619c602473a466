//! AI service seams: translation and summarization
//!
//! Backends are consumed through [`Translator`] and [`Summarizer`]; they take
//! text in and return text or a [`ServiceError`]. [`gemini::GeminiClient`]
//! implements both over HTTP.

pub mod gemini;

use glovelink_core::LogEntry;

pub use gemini::GeminiClient;

/// Failure reported by an AI backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Backend unreachable, overloaded or returned nothing usable
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Backend rejected the request itself
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// Result returned by AI backends
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Machine translation capability
#[trait_variant::make(Translator: Send)]
pub trait LocalTranslator {
    /// Translate `text` into `target_language` (an ISO 639-1 code such as "fr")
    async fn translate(&self, text: &str, target_language: &str) -> ServiceResult<String>;
}

/// Summarization capability
#[trait_variant::make(Summarizer: Send)]
pub trait LocalSummarizer {
    /// Produce a short prose summary of `entries`
    async fn summarize(&self, entries: &[LogEntry]) -> ServiceResult<String>;
}
