//! Composition root: wires the connection manager, send pipeline, history
//! store, and event fan-out behind the two operations collaborators need.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::BridgeConfig;
use crate::conn::{BridgeState, ConnectionManager, HandleSlot};
use crate::error::BridgeError;
use crate::event::ChatEvent;
use crate::history::RecentMessageStore;
use crate::send::{DeadLetter, SendPipeline};

/// Capacity of the live event fan-out. A subscriber that falls this far
/// behind skips messages instead of exerting backpressure on the read loop.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// The chat bridge.
///
/// Owns two background tasks: the connection manager (read loop) and the
/// delivery worker. All methods are safe to call concurrently with both.
/// Works with or without credentials — see [`BridgeConfig::enabled`].
pub struct ChatBridge {
    store: RecentMessageStore,
    pipeline: SendPipeline,
    events: broadcast::Sender<ChatEvent>,
    config: watch::Sender<BridgeConfig>,
    state: watch::Receiver<BridgeState>,
    shutdown: watch::Sender<bool>,
    manager_task: tokio::task::JoinHandle<()>,
    worker_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ChatBridge {
    /// Start the bridge with the given configuration.
    pub fn spawn(config: BridgeConfig) -> Self {
        let store = RecentMessageStore::default();
        let slot: HandleSlot = Arc::new(RwLock::new(None));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (config_tx, config_rx) = watch::channel(config);
        let (state_tx, state_rx) = watch::channel(BridgeState::Disabled);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dead_tx, mut dead_rx) = mpsc::unbounded_channel::<DeadLetter>();

        let manager_task = ConnectionManager::spawn(
            config_rx.clone(),
            store.clone(),
            events.clone(),
            slot.clone(),
            state_tx,
            shutdown_rx.clone(),
        );

        let (pipeline, delivery_task) =
            SendPipeline::spawn(config_rx, slot, dead_tx, shutdown_rx);

        // Failure sink: dead letters are reported here and nowhere else.
        let sink_task = tokio::spawn(async move {
            while let Some(dead) = dead_rx.recv().await {
                tracing::error!(text = %dead.text, cause = %dead.cause, "message dead-lettered");
            }
        });

        Self {
            store,
            pipeline,
            events,
            config: config_tx,
            state: state_rx,
            shutdown: shutdown_tx,
            manager_task,
            worker_tasks: vec![delivery_task, sink_task],
        }
    }

    /// Queue a message for delivery to the channel.
    ///
    /// Returns once the message is accepted; delivery is asynchronous and
    /// best-effort. The only failures surfaced here are empty input and a
    /// bridge that has been shut down — transport faults never reach the
    /// caller.
    pub fn send(&self, text: &str) -> Result<(), BridgeError> {
        if text.trim().is_empty() {
            return Err(BridgeError::EmptyMessage);
        }
        self.pipeline.enqueue(text.to_string())
    }

    /// Up to `n` most recent chat lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        self.store.recent(n)
    }

    /// Drop all stored history.
    pub fn clear_history(&self) {
        self.store.clear();
    }

    /// Subscribe to live chat events from this point forward. Each call
    /// returns an independent receiver; history is never replayed.
    pub fn events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Replace the configuration. Takes effect at the next connect and send
    /// decision points; supplying credentials here enables a bridge that
    /// started disabled.
    pub fn update_config(&self, config: BridgeConfig) {
        let _ = self.config.send(config);
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn state_changes(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }

    /// Stop both background tasks and release the connection.
    ///
    /// Deterministic: returns only after the read loop and delivery worker
    /// have exited and the socket has been dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.manager_task.await {
            tracing::debug!(error = %e, "connection manager task panicked");
        }
        for task in self.worker_tasks {
            task.abort();
            let _ = task.await;
        }
    }
}
