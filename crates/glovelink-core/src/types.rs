//! Core domain types

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Free-form connection details (signal strength, baud rate, device ids).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Physical link used to reach the glove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Serial,
    Radio,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Serial => "serial",
            TransportKind::Radio => "radio",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a message travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the device (or a local diagnostic)
    In,
    /// Sent to the device
    Out,
}

impl Direction {
    /// Arrow prefix used when rendering a log line
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::In => "<",
            Direction::Out => ">",
        }
    }
}

/// A single journaled message.
///
/// Entries are immutable once created. The JSON shape (`id`, `timestamp`,
/// `direction`, `text`) is what the journal stores on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub text: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(direction: Direction, text: impl Into<String>) -> Self {
        Self::at(Utc::now(), direction, text)
    }

    /// Create an entry with an explicit capture time
    pub fn at(timestamp: DateTime<Utc>, direction: Direction, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            direction,
            text: text.into(),
        }
    }

    pub fn incoming(text: impl Into<String>) -> Self {
        Self::new(Direction::In, text)
    }

    pub fn outgoing(text: impl Into<String>) -> Self {
        Self::new(Direction::Out, text)
    }

    /// UTC calendar day this entry is journaled under
    pub fn partition_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Render as `HH:MM:SS > text` in local time
    pub fn display_line(&self) -> String {
        let local = self.timestamp.with_timezone(&chrono::Local);
        format!(
            "{} {} {}",
            local.format("%H:%M:%S"),
            self.direction.arrow(),
            self.text
        )
    }
}

/// Connection lifecycle of a device session.
///
/// Replaced as a whole on every transition; never partially updated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting {
        kind: TransportKind,
    },
    Connected {
        kind: TransportKind,
        metadata: Metadata,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }

    pub fn kind(&self) -> Option<TransportKind> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting { kind } | ConnectionState::Connected { kind, .. } => {
                Some(*kind)
            }
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            ConnectionState::Connected { metadata, .. } => Some(metadata),
            _ => None,
        }
    }
}
