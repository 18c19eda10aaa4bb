//! Session lifecycle phase
//!
//! Role flags (publishing, playing, idling, paused) live in
//! [`SharedState`](super::SharedState) because other sessions read them.

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Handshake in progress
    Handshaking,
    /// Handshake complete, waiting for connect command
    WaitingConnect,
    /// Connect command accepted
    Connected,
    /// Session stopped
    Closed,
}

impl SessionPhase {
    pub fn is_connected(&self) -> bool {
        *self == SessionPhase::Connected
    }

    pub fn is_closed(&self) -> bool {
        *self == SessionPhase::Closed
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Handshaking
    }
}
