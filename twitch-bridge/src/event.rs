//! Chat events emitted by the bridge for live consumers.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single user chat message, as parsed from the wire.
///
/// Produced only from lines classified as user chat posts (PRIVMSG); system
/// and control lines never become events. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEvent {
    /// Sender nick. Never empty.
    pub username: String,
    /// Message body with protocol framing stripped.
    pub content: String,
    /// When the line was received by the read loop.
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    pub fn new(username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    /// History line format: `"username: content"`.
    pub fn formatted(&self) -> String {
        format!("{}: {}", self.username, self.content)
    }
}
