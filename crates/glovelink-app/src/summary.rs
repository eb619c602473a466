//! Day summaries through a [`Summarizer`] backend

use glovelink_core::prelude::*;
use glovelink_core::LogEntry;

use crate::ai::Summarizer;

/// Text used when a day has no entries
pub const EMPTY_DAY: &str = "No messages were recorded on this day.";

pub struct LogAnalyzer<S> {
    summarizer: S,
}

impl<S: Summarizer> LogAnalyzer<S> {
    pub fn new(summarizer: S) -> Self {
        Self { summarizer }
    }

    /// Summarize `entries`; an empty day never reaches the backend.
    ///
    /// Backend failures surface as [`Error::SummarizationFailed`].
    pub async fn summarize(&self, entries: &[LogEntry]) -> Result<String> {
        if entries.is_empty() {
            return Ok(EMPTY_DAY.to_string());
        }

        info!("Summarizing {} entries", entries.len());
        self.summarizer
            .summarize(entries)
            .await
            .map_err(|e| Error::summarization(e.to_string()))
    }

    /// Summarize, degrading a failure to an inline marker
    pub async fn summarize_or_marker(&self, entries: &[LogEntry]) -> String {
        match self.summarize(entries).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("{}", e);
                format!("[summary unavailable: {e}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ServiceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSummarizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Summarizer for CountingSummarizer {
        async fn summarize(&self, entries: &[LogEntry]) -> std::result::Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ServiceError::ServiceUnavailable("offline".into()))
            } else {
                Ok(format!("{} messages", entries.len()))
            }
        }
    }

    #[tokio::test]
    async fn test_empty_day_short_circuits() {
        let analyzer = LogAnalyzer::new(CountingSummarizer::default());
        assert_eq!(analyzer.summarize(&[]).await.unwrap(), EMPTY_DAY);
        assert_eq!(analyzer.summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_summary_from_backend() {
        let analyzer = LogAnalyzer::new(CountingSummarizer::default());
        let entries = vec![LogEntry::outgoing("ping"), LogEntry::incoming("pong")];
        assert_eq!(analyzer.summarize(&entries).await.unwrap(), "2 messages");
    }

    #[tokio::test]
    async fn test_failure_degrades_to_marker() {
        let analyzer = LogAnalyzer::new(CountingSummarizer {
            fail: true,
            ..Default::default()
        });
        let entries = vec![LogEntry::incoming("x")];

        assert!(matches!(
            analyzer.summarize(&entries).await,
            Err(Error::SummarizationFailed { .. })
        ));
        assert!(analyzer
            .summarize_or_marker(&entries)
            .await
            .starts_with("[summary unavailable:"));
    }
}
