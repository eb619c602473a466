//! Headless mode - NDJSON event output
//!
//! `glovelink connect` runs without any UI: session events are written to
//! stdout as NDJSON (one JSON object per line) and stdin lines are sent to the
//! device. Logs go to the log file, never to stdout.
//!
//! # Example Output
//!
//! ```json
//! {"event":"state_changed","state":"connecting","transport":"serial","timestamp":1704700001000}
//! {"event":"state_changed","state":"connected","transport":"serial","metadata":{"port":"/dev/ttyUSB0"},"timestamp":1704700001050}
//! {"event":"message","direction":"out","id":"5b0c...","text":"ping","timestamp":1704700002000}
//! {"event":"message","direction":"in","id":"9e41...","text":"pong","timestamp":1704700002010}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use glovelink_core::{ConnectionState, Direction, LogEntry, Metadata, SessionEvent};

/// Events emitted in headless mode
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Connection state replaced
    StateChanged {
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        transport: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Metadata>,
        timestamp: i64,
    },

    /// A journaled message, either direction
    Message {
        direction: Direction,
        id: String,
        text: String,
        timestamp: i64,
    },

    /// Connected metadata refreshed
    MetadataUpdated { metadata: Metadata, timestamp: i64 },

    /// Non-fatal failure reported by the session
    Fault { message: String, timestamp: i64 },

    /// Error in the headless runner itself
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = self.write_to(&mut stdout) {
            error!("Failed to write headless event to stdout: {}", e);
        }
    }

    /// Write this event as one NDJSON line and flush
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        let json = serde_json::to_string(self).map_err(io::Error::other)?;
        writeln!(out, "{}", json)?;
        out.flush()
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn state_changed(state: &ConnectionState) -> Self {
        let (label, metadata) = match state {
            ConnectionState::Disconnected => ("disconnected", None),
            ConnectionState::Connecting { .. } => ("connecting", None),
            ConnectionState::Connected { metadata, .. } => ("connected", Some(metadata.clone())),
        };
        Self::StateChanged {
            state: label,
            transport: state.kind().map(|k| k.to_string()),
            metadata,
            timestamp: Self::now(),
        }
    }

    /// Message event; the timestamp is the entry's capture instant
    pub fn message(entry: &LogEntry) -> Self {
        Self::Message {
            direction: entry.direction,
            id: entry.id.clone(),
            text: entry.text.clone(),
            timestamp: entry.timestamp.timestamp_millis(),
        }
    }

    pub fn metadata_updated(metadata: &Metadata) -> Self {
        Self::MetadataUpdated {
            metadata: metadata.clone(),
            timestamp: Self::now(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: impl Into<String>, fatal: bool) -> Self {
        Self::Error {
            message: message.into(),
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&SessionEvent> for HeadlessEvent {
    fn from(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::MessageReceived(entry) | SessionEvent::MessageSent(entry) => {
                Self::message(entry)
            }
            SessionEvent::StateChanged(state) => Self::state_changed(state),
            SessionEvent::MetadataUpdated(metadata) => Self::metadata_updated(metadata),
            SessionEvent::Fault { message } => Self::fault(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glovelink_core::TransportKind;

    fn json(event: &HeadlessEvent) -> serde_json::Value {
        let mut buf = Vec::new();
        event.write_to(&mut buf).unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));
        serde_json::from_slice(&buf).unwrap()
    }

    #[test]
    fn test_state_changed_format() {
        let mut metadata = Metadata::new();
        metadata.insert("port".into(), serde_json::json!("/dev/ttyUSB0"));
        let state = ConnectionState::Connected {
            kind: TransportKind::Serial,
            metadata,
        };

        let value = json(&HeadlessEvent::state_changed(&state));
        assert_eq!(value["event"], "state_changed");
        assert_eq!(value["state"], "connected");
        assert_eq!(value["transport"], "serial");
        assert_eq!(value["metadata"]["port"], "/dev/ttyUSB0");
        assert!(value["timestamp"].is_i64());
    }

    #[test]
    fn test_disconnected_omits_optional_fields() {
        let value = json(&HeadlessEvent::state_changed(&ConnectionState::Disconnected));
        assert_eq!(value["state"], "disconnected");
        assert!(value.get("transport").is_none());
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_message_from_session_event() {
        let entry = LogEntry::outgoing("ping");
        let event = HeadlessEvent::from(&SessionEvent::MessageSent(entry.clone()));

        let value = json(&event);
        assert_eq!(value["event"], "message");
        assert_eq!(value["direction"], "out");
        assert_eq!(value["text"], "ping");
        assert_eq!(value["id"], entry.id.as_str());
        assert_eq!(value["timestamp"], entry.timestamp.timestamp_millis());
    }

    #[test]
    fn test_fault_and_error() {
        let value = json(&HeadlessEvent::from(&SessionEvent::Fault {
            message: "disk full".into(),
        }));
        assert_eq!(value["event"], "fault");
        assert_eq!(value["message"], "disk full");

        let value = json(&HeadlessEvent::error("no ports", true));
        assert_eq!(value["event"], "error");
        assert_eq!(value["fatal"], true);
    }
}
