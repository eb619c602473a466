//! Events emitted by a device session to its listeners

use crate::types::{ConnectionState, LogEntry, Metadata};

/// Notification published by the session facade.
///
/// Message events are only published after the entry has been handed to the
/// journal, so a listener never displays something the journal lacks.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A line arrived from the device, or a diagnostic was journaled
    MessageReceived(LogEntry),

    /// A line was written to the device
    MessageSent(LogEntry),

    /// The connection state was replaced
    StateChanged(ConnectionState),

    /// Connected metadata was refreshed without a state transition
    MetadataUpdated(Metadata),

    /// A failure that did not change the message flow (persistence, teardown)
    Fault { message: String },
}

impl SessionEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageReceived(_) => "message_received",
            Self::MessageSent(_) => "message_sent",
            Self::StateChanged(_) => "state_changed",
            Self::MetadataUpdated(_) => "metadata_updated",
            Self::Fault { .. } => "fault",
        }
    }
}
