//! Errors that cross the bridge boundary.
//!
//! Transport faults (connect/auth/read/write failures) are absorbed inside
//! the bridge: they drive reconnects, retries, and dead-letters, but are
//! never returned to callers. Only input validation and shutdown are
//! surfaced here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// `send` was called with an empty message.
    #[error("message text must not be empty")]
    EmptyMessage,

    /// The bridge has been shut down; no further operations are accepted.
    #[error("bridge is shut down")]
    Shutdown,
}
