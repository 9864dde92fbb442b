//! Outbound delivery: queue, bounded retry, dead-letter routing.
//!
//! Callers only ever learn that a message was queued. A single worker task
//! attempts delivery against the current connection handle, re-fetching it
//! per attempt so a reconnect mid-retry is picked up. Exhausted messages are
//! converted to dead letters and handed to the failure sink; nothing
//! propagates back to the `send` caller.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::config::BridgeConfig;
use crate::conn::HandleSlot;
use crate::error::BridgeError;

/// Attempts per message before dead-lettering.
pub const MAX_ATTEMPTS: u32 = 3;
/// Fixed delay between attempts. Bounds a permanently failing send to
/// roughly `MAX_ATTEMPTS` seconds before it is dead-lettered.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// A message that exhausted its retry budget.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub text: String,
    pub cause: String,
}

#[derive(Debug)]
struct OutboundMessage {
    text: String,
    attempt: u32,
}

/// Accepts outgoing text and owns the delivery worker.
pub(crate) struct SendPipeline {
    queue: mpsc::UnboundedSender<OutboundMessage>,
}

impl SendPipeline {
    /// Start the delivery worker. Returns the pipeline and its join handle.
    pub(crate) fn spawn(
        config: watch::Receiver<BridgeConfig>,
        slot: HandleSlot,
        dead_letters: mpsc::UnboundedSender<DeadLetter>,
        mut shutdown: watch::Receiver<bool>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (queue, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let worker = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(m) => m,
                        None => break,
                    },
                    _ = shutdown.changed() => break,
                };
                deliver(message, &config, &slot, &dead_letters, &mut shutdown).await;
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::debug!("delivery worker stopped");
        });
        (Self { queue }, worker)
    }

    /// Enqueue text for delivery. Returns as soon as the message is queued.
    pub(crate) fn enqueue(&self, text: String) -> Result<(), BridgeError> {
        self.queue
            .send(OutboundMessage { text, attempt: 0 })
            .map_err(|_| BridgeError::Shutdown)
    }
}

/// Run one message through the retry loop.
async fn deliver(
    mut message: OutboundMessage,
    config: &watch::Receiver<BridgeConfig>,
    slot: &HandleSlot,
    dead_letters: &mpsc::UnboundedSender<DeadLetter>,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        // Config is re-evaluated per attempt: in disabled mode the message
        // is dropped without a transport attempt and without a dead letter.
        if !config.borrow().enabled() {
            tracing::info!(text = %message.text, "no chat credentials, skipping send");
            return;
        }

        let handle = slot.read().clone();
        let outcome = match handle {
            Some(h) => h.send_chat(&message.text).await,
            None => Err(anyhow::anyhow!("not connected")),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(text = %message.text, "message sent");
                return;
            }
            Err(e) => {
                message.attempt += 1;
                if message.attempt >= MAX_ATTEMPTS {
                    tracing::error!(
                        text = %message.text,
                        error = %e,
                        attempts = message.attempt,
                        "send failed after retries"
                    );
                    let _ = dead_letters.send(DeadLetter {
                        text: message.text,
                        cause: e.to_string(),
                    });
                    return;
                }
                tracing::warn!(
                    error = %e,
                    attempt = message.attempt,
                    "send attempt failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}
