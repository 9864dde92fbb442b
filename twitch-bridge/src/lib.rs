//! Twitch chat bridge.
//!
//! Maintains a persistent authenticated connection to a single Twitch chat
//! channel over IRC, ingests incoming chat lines into a bounded in-memory
//! history, and relays outgoing messages with bounded retry and
//! dead-lettering. Runs happily with no credentials at all: in that
//! disabled mode sends are accepted and dropped, reads return nothing, and
//! the API surface stays callable so tooling keeps working.
//!
//! ```rust,no_run
//! use twitch_bridge::{BridgeConfig, ChatBridge};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let bridge = ChatBridge::spawn(BridgeConfig {
//!     channel: Some("somechannel".into()),
//!     auth_token: Some("mytoken".into()),
//!     ..Default::default()
//! });
//!
//! bridge.send("hello chat")?;
//! let last_twenty = bridge.recent(20);
//!
//! let mut events = bridge.events();
//! while let Ok(event) = events.recv().await {
//!     println!("{}: {}", event.username, event.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod conn;
pub mod error;
pub mod event;
pub mod history;
pub mod irc;
pub mod send;

pub use bridge::ChatBridge;
pub use config::BridgeConfig;
pub use conn::BridgeState;
pub use error::BridgeError;
pub use event::ChatEvent;
pub use history::RecentMessageStore;
pub use send::DeadLetter;
