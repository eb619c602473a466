//! Read-through translation cache
//!
//! Keys are `(source text, target language)`. A successful translation is
//! written once and served from memory afterwards; failures are never
//! cached. The lock is not held while the backend runs, so two concurrent
//! misses for the same key may both call out; the first result stored wins.

use std::collections::HashMap;

use tokio::sync::Mutex;

use glovelink_core::prelude::*;
use glovelink_core::LogEntry;

use crate::ai::{ServiceError, Translator};

/// A journal entry paired with its translation (or an inline failure marker)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedEntry {
    pub entry: LogEntry,
    pub translated: String,
}

/// Inline marker shown in place of a failed translation
pub fn translation_marker(err: &ServiceError) -> String {
    format!("[translation unavailable: {err}]")
}

pub struct TranslationCache<T> {
    translator: T,
    entries: Mutex<HashMap<(String, String), String>>,
}

impl<T: Translator> TranslationCache<T> {
    pub fn new(translator: T) -> Self {
        Self {
            translator,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    /// Number of cached translations
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Translate through the cache.
    ///
    /// Backend failures surface as [`Error::TranslationFailed`].
    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let key = (text.to_string(), target_language.to_string());

        if let Some(hit) = self.entries.lock().await.get(&key) {
            trace!("translation cache hit ({})", target_language);
            return Ok(hit.clone());
        }

        let translated = self
            .translator
            .translate(text, target_language)
            .await
            .map_err(|e| Error::translation(e.to_string()))?;

        let mut entries = self.entries.lock().await;
        Ok(entries.entry(key).or_insert(translated).clone())
    }

    /// Translate, degrading a failure to an inline marker
    pub async fn translate_or_marker(&self, text: &str, target_language: &str) -> String {
        let key = (text.to_string(), target_language.to_string());
        if let Some(hit) = self.entries.lock().await.get(&key) {
            return hit.clone();
        }

        match self.translator.translate(text, target_language).await {
            Ok(translated) => {
                let mut entries = self.entries.lock().await;
                entries.entry(key).or_insert(translated).clone()
            }
            Err(e) => {
                warn!("Translation to {} failed: {}", target_language, e);
                translation_marker(&e)
            }
        }
    }

    /// Translate a day's entries in order; each one degrades independently
    pub async fn translate_entries(
        &self,
        entries: Vec<LogEntry>,
        target_language: &str,
    ) -> Vec<TranslatedEntry> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let translated = self.translate_or_marker(&entry.text, target_language).await;
            out.push(TranslatedEntry { entry, translated });
        }
        out
    }
}
