//! Connection state machine
//!
//! Single source of truth for the facade's [`ConnectionState`]. Every
//! transition replaces the whole state value; readers always get a
//! consistent snapshot.
//!
//! ```text
//! Disconnected --begin_connect--> Connecting --connected--> Connected
//!      ^                              |                        |
//!      +---------disconnected---------+-----------------------+
//! ```

use std::sync::Mutex;

use glovelink_core::prelude::*;
use glovelink_core::{ConnectionState, Metadata, TransportKind};

#[derive(Debug, Default)]
pub struct ConnectionMachine {
    state: Mutex<ConnectionState>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state snapshot
    pub fn state(&self) -> ConnectionState {
        self.lock().clone()
    }

    /// `Disconnected -> Connecting`.
    ///
    /// Rejects a second connect without touching the current state.
    pub fn begin_connect(&self, kind: TransportKind) -> Result<ConnectionState> {
        let mut state = self.lock();
        match &*state {
            ConnectionState::Connecting { .. } => Err(Error::AlreadyConnecting),
            ConnectionState::Connected { .. } => Err(Error::AlreadyConnected),
            ConnectionState::Disconnected => {
                *state = ConnectionState::Connecting { kind };
                Ok(state.clone())
            }
        }
    }

    /// `Connecting -> Connected`
    pub fn connected(&self, kind: TransportKind, metadata: Metadata) -> ConnectionState {
        let mut state = self.lock();
        if !matches!(&*state, ConnectionState::Connecting { .. }) {
            warn!("Connected from unexpected state {:?}", *state);
        }
        *state = ConnectionState::Connected { kind, metadata };
        state.clone()
    }

    /// Any state -> `Disconnected`.
    ///
    /// Returns `None` when already disconnected (no transition happened).
    pub fn disconnected(&self) -> Option<ConnectionState> {
        let mut state = self.lock();
        if state.is_disconnected() {
            return None;
        }
        *state = ConnectionState::Disconnected;
        Some(ConnectionState::Disconnected)
    }

    /// Merge fresh metadata into a `Connected` state in place.
    ///
    /// Not a transition; returns the merged map, or `None` when not connected.
    pub fn update_metadata(&self, update: Metadata) -> Option<Metadata> {
        let mut state = self.lock();
        match &mut *state {
            ConnectionState::Connected { metadata, .. } => {
                metadata.extend(update);
                Some(metadata.clone())
            }
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
