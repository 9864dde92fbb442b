//! Connection lifecycle: connect, authenticate, join, read loop, reconnect.
//!
//! One spawned task owns the connection. It re-evaluates the config at every
//! decision point, so the bridge moves between `Disabled` and the connected
//! states as credentials appear or disappear at runtime. Transport faults
//! drive reconnection with backoff; nothing here is fatal to the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};

use crate::config::BridgeConfig;
use crate::event::ChatEvent;
use crate::history::RecentMessageStore;
use crate::irc::{self, Message};

/// Observable lifecycle states of the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No valid credentials; ingestion and transport are no-ops.
    Disabled,
    Connecting,
    Connected,
    /// Registered, joined, and consuming inbound lines.
    ReadLoop,
    Reconnecting,
    /// Terminal; set once on shutdown.
    Stopped,
}

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const BACKOFF_FACTOR: f64 = 2.0;

/// Shared slot for the live connection handle. Replaced atomically on
/// (re)connect and cleared on every exit path, so senders either see a fully
/// joined handle or none at all.
pub type HandleSlot = Arc<RwLock<Option<ConnectionHandle>>>;

/// Write access to an authenticated, joined connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    channel: String,
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl ConnectionHandle {
    pub fn new(channel: impl Into<String>, writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            channel: channel.into(),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
        }
    }

    /// Channel this handle is joined to (without the leading `#`).
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Write one raw IRC line (CRLF appended) and flush.
    pub async fn write_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .context("write failed")?;
        writer.flush().await.context("flush failed")?;
        Ok(())
    }

    /// Send a chat message to the joined channel.
    pub async fn send_chat(&self, text: &str) -> Result<()> {
        self.write_line(&format!("PRIVMSG #{} :{}", self.channel, text))
            .await
    }
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    ConfigChanged,
}

pub(crate) struct ConnectionManager {
    config: watch::Receiver<BridgeConfig>,
    store: RecentMessageStore,
    events: broadcast::Sender<ChatEvent>,
    slot: HandleSlot,
    state: watch::Sender<BridgeState>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub(crate) fn spawn(
        config: watch::Receiver<BridgeConfig>,
        store: RecentMessageStore,
        events: broadcast::Sender<ChatEvent>,
        slot: HandleSlot,
        state: watch::Sender<BridgeState>,
        shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Self {
            config,
            store,
            events,
            slot,
            state,
            shutdown,
        };
        tokio::spawn(manager.run())
    }

    async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let snapshot = self.config.borrow().clone();
            let Some((channel, token)) = snapshot
                .credentials()
                .map(|(c, t)| (c.to_string(), t.to_string()))
            else {
                self.clear_handle();
                self.set_state(BridgeState::Disabled);
                tokio::select! {
                    changed = self.config.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.shutdown.changed() => {}
                }
                continue;
            };

            self.set_state(BridgeState::Connecting);
            match self
                .run_session(&snapshot.server_addr, &channel, &token, &mut backoff)
                .await
            {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::ConfigChanged) => {
                    // Loop re-evaluates with the new snapshot.
                    self.clear_handle();
                }
                Err(e) => {
                    self.clear_handle();
                    self.set_state(BridgeState::Reconnecting);
                    tracing::warn!(
                        error = %e,
                        delay_secs = backoff.as_secs(),
                        "connection lost, will reconnect"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.shutdown.changed() => break,
                        changed = self.config.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    backoff = next_backoff(backoff);
                }
            }
        }
        self.clear_handle();
        self.set_state(BridgeState::Stopped);
        tracing::debug!("connection manager stopped");
    }

    /// Connect, authenticate, join, then consume inbound lines until the
    /// session ends. The socket is dropped (closed) on every exit path.
    async fn run_session(
        &mut self,
        server_addr: &str,
        channel: &str,
        token: &str,
        backoff: &mut Duration,
    ) -> Result<SessionEnd> {
        let stream = tokio::select! {
            conn = TcpStream::connect(server_addr) => {
                conn.with_context(|| format!("TCP connect to {server_addr} failed"))?
            }
            _ = self.shutdown.changed() => return Ok(SessionEnd::Shutdown),
        };
        let (reader, writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let handle = ConnectionHandle::new(channel, Box::new(writer));

        // Twitch handshake: PASS before NICK, nick is the channel login.
        handle.write_line(&format!("PASS oauth:{token}")).await?;
        handle
            .write_line(&format!("NICK {}", channel.to_lowercase()))
            .await?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, await_registration(&mut reader))
            .await
            .map_err(|_| anyhow!("registration timed out"))??;

        handle
            .write_line(&format!("JOIN #{}", channel.to_lowercase()))
            .await?;

        self.set_state(BridgeState::Connected);
        *self.slot.write() = Some(handle.clone());
        *backoff = INITIAL_BACKOFF;
        tracing::info!(channel = %channel, server = %server_addr, "joined channel");

        self.set_state(BridgeState::ReadLoop);
        let mut line = String::new();
        loop {
            line.clear();
            tokio::select! {
                result = reader.read_line(&mut line) => {
                    let n = result.context("read failed")?;
                    if n == 0 {
                        bail!("connection closed by server");
                    }
                    self.ingest_line(&line, &handle).await;
                }
                _ = self.shutdown.changed() => return Ok(SessionEnd::Shutdown),
                changed = self.config.changed() => {
                    if changed.is_err() {
                        return Ok(SessionEnd::Shutdown);
                    }
                    if self.session_config_changed(server_addr, channel, token) {
                        tracing::info!("configuration changed, leaving session");
                        return Ok(SessionEnd::ConfigChanged);
                    }
                }
            }
        }
    }

    /// Handle one inbound line: keepalive, then chat-event extraction.
    async fn ingest_line(&self, line: &str, handle: &ConnectionHandle) {
        let Some(msg) = Message::parse(line) else {
            return;
        };
        match msg.command.as_str() {
            "PING" => {
                let payload = msg.params.first().map(String::as_str).unwrap_or("");
                if let Err(e) = handle.write_line(&format!("PONG :{payload}")).await {
                    // The read loop will observe the broken socket next.
                    tracing::debug!(error = %e, "PONG write failed");
                }
            }
            "PRIVMSG" => {
                if let Some(event) = irc::chat_event(line, &msg.command, msg.sender_nick()) {
                    tracing::debug!(from = %event.username, "chat message received");
                    self.store.append(event.formatted());
                    let _ = self.events.send(event);
                }
            }
            // Joins, parts, modes, notices and numerics are not chat.
            _ => {}
        }
    }

    /// True when the watched config no longer matches the running session.
    fn session_config_changed(&self, server_addr: &str, channel: &str, token: &str) -> bool {
        let config = self.config.borrow();
        config.server_addr != server_addr
            || config.credentials() != Some((channel, token))
    }

    fn clear_handle(&self) {
        *self.slot.write() = None;
    }

    fn set_state(&self, state: BridgeState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

/// Read lines until the server confirms registration (001) or rejects the
/// login. Auth rejection arrives as a NOTICE on Twitch.
async fn await_registration<R>(reader: &mut BufReader<R>) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).await.context("read failed")?;
        if n == 0 {
            bail!("connection closed during registration");
        }
        let Some(msg) = Message::parse(&line) else {
            continue;
        };
        match msg.command.as_str() {
            "001" => return Ok(()),
            "NOTICE" => {
                let text = msg.params.last().map(String::as_str).unwrap_or("");
                if text.contains("Login unsuccessful")
                    || text.contains("Login authentication failed")
                {
                    bail!("authentication rejected: {text}");
                }
            }
            _ => {}
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    let jitter = rand_jitter(current.as_millis() as u64 / 4);
    Duration::from_millis(
        ((current.as_millis() as f64 * BACKOFF_FACTOR) as u64 + jitter)
            .min(MAX_BACKOFF.as_millis() as u64),
    )
}

/// Simple jitter: pseudo-random value 0..max from the clock.
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    nanos % max
}
