//! Application error types with rich context

use thiserror::Error;

use crate::types::TransportKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command line error: {message}")]
    Cli { message: String },

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────
    #[error("{kind} transport is not available on this host: {reason}")]
    TransportUnavailable { kind: TransportKind, reason: String },

    #[error("{kind} transport request was declined: {reason}")]
    TransportDenied { kind: TransportKind, reason: String },

    #[error("Failed to open {kind} transport: {reason}")]
    TransportOpenFailed { kind: TransportKind, reason: String },

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Failed to write to device: {reason}")]
    WriteFailed { reason: String },

    #[error("Message cannot be sent: {reason}")]
    InvalidMessage { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Connection State Errors
    // ─────────────────────────────────────────────────────────────
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Already connected to a device")]
    AlreadyConnected,

    // ─────────────────────────────────────────────────────────────
    // Journal Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to persist journal: {reason}")]
    PersistenceFailed { reason: String },

    // ─────────────────────────────────────────────────────────────
    // AI Service Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Translation failed: {reason}")]
    TranslationFailed { reason: String },

    #[error("Summarization failed: {reason}")]
    SummarizationFailed { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn cli(message: impl Into<String>) -> Self {
        Self::Cli {
            message: message.into(),
        }
    }

    pub fn unavailable(kind: TransportKind, reason: impl Into<String>) -> Self {
        Self::TransportUnavailable {
            kind,
            reason: reason.into(),
        }
    }

    pub fn denied(kind: TransportKind, reason: impl Into<String>) -> Self {
        Self::TransportDenied {
            kind,
            reason: reason.into(),
        }
    }

    pub fn open_failed(kind: TransportKind, reason: impl Into<String>) -> Self {
        Self::TransportOpenFailed {
            kind,
            reason: reason.into(),
        }
    }

    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_message(reason: impl Into<String>) -> Self {
        Self::InvalidMessage {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::PersistenceFailed {
            reason: reason.into(),
        }
    }

    pub fn translation(reason: impl Into<String>) -> Self {
        Self::TranslationFailed {
            reason: reason.into(),
        }
    }

    pub fn summarization(reason: impl Into<String>) -> Self {
        Self::SummarizationFailed {
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::open_failed(TransportKind::Serial, "port busy");
        assert_eq!(err.to_string(), "Failed to open serial transport: port busy");

        let err = Error::NotConnected;
        assert!(err.to_string().contains("Not connected"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_invalid_message_display() {
        let err = Error::invalid_message("contains a line break");
        assert_eq!(
            err.to_string(),
            "Message cannot be sent: contains a line break"
        );
    }
}
