//! Best-effort change notifications between instances
//!
//! Mirrors a same-origin broadcast channel: every instance that joins a named
//! channel on the same hub sees messages posted by the others. Delivery is an
//! optimization only; nothing may depend on it for correctness.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Wire message announcing that a sibling consumed a call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallNotice {
    Call { timestamp: i64 },
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: Uuid,
    payload: String,
}

/// Registry of named channels; clone it to hand the same hub to many instances
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `name`, creating it on first use
    pub fn channel(&self, name: &str) -> BroadcastChannel {
        let sender = self
            .channels
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        BroadcastChannel {
            name: name.to_string(),
            origin: Uuid::new_v4(),
            sender,
        }
    }
}

/// One instance's handle on a named channel
pub struct BroadcastChannel {
    name: String,
    origin: Uuid,
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Post a notice to every other member; silently dropped if nobody listens
    pub fn post(&self, notice: &CallNotice) {
        let payload = match serde_json::to_string(notice) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(channel = %self.name, "Failed to encode notice: {}", e);
                return;
            }
        };
        let _ = self.sender.send(Envelope {
            origin: self.origin,
            payload,
        });
    }

    /// Start receiving notices posted by other members
    pub fn subscribe(&self) -> NoticeReceiver {
        NoticeReceiver {
            origin: self.origin,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving half; skips this instance's own messages
pub struct NoticeReceiver {
    origin: Uuid,
    receiver: broadcast::Receiver<Envelope>,
}

impl NoticeReceiver {
    /// Next notice from a sibling, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<CallNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => match serde_json::from_str(&envelope.payload) {
                    Ok(notice) => return Some(notice),
                    Err(e) => tracing::debug!("Ignoring malformed notice: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Notice receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
