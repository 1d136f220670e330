//! Sliding-window call budget shared across instances
//!
//! The list of recent call timestamps lives in the durable key-value store,
//! so every instance opened on the same store draws from one budget. Each
//! check re-reads the list before deciding. Read-modify-write is not locked:
//! two instances racing on the last slot may both be admitted.
//!
//! A broadcast subscription keeps an in-memory mirror current with sibling
//! calls; the mirror is only consulted when the store cannot be read.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::RateSettings;
use crate::storage::{now_ms, BroadcastChannel, CallNotice, KeyValueStore};

/// Outcome of [`RateGovernor::can_make_call`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the oldest call leaves the window, when denied
    pub wait_time: Option<u64>,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait_time: None,
        }
    }

    fn denied(wait_time: u64) -> Self {
        Self {
            allowed: false,
            wait_time: Some(wait_time),
        }
    }
}

pub struct RateGovernor {
    settings: RateSettings,
    storage_key: String,
    store: Arc<dyn KeyValueStore>,
    channel: Option<BroadcastChannel>,
    mirror: Arc<Mutex<Vec<i64>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl RateGovernor {
    /// Create a governor; with a channel and a running tokio runtime it also
    /// listens for sibling calls
    pub fn new(
        settings: RateSettings,
        namespace: &str,
        store: Arc<dyn KeyValueStore>,
        channel: Option<BroadcastChannel>,
    ) -> Self {
        let mirror = Arc::new(Mutex::new(Vec::new()));

        let listener = match (&channel, tokio::runtime::Handle::try_current()) {
            (Some(channel), Ok(handle)) => {
                let mut receiver = channel.subscribe();
                let mirror = mirror.clone();
                Some(handle.spawn(async move {
                    while let Some(notice) = receiver.recv().await {
                        match notice {
                            CallNotice::Call { timestamp } => {
                                let mut calls = mirror.lock();
                                calls.push(timestamp);
                                calls.sort_unstable();
                            }
                        }
                    }
                }))
            }
            (Some(_), Err(_)) => {
                tracing::debug!("No tokio runtime, rate governor will not follow sibling calls");
                None
            }
            (None, _) => None,
        };

        Self {
            settings,
            storage_key: format!("{namespace}.rate_calls"),
            store,
            channel,
            mirror,
            listener: Mutex::new(listener),
        }
    }

    pub fn settings(&self) -> &RateSettings {
        &self.settings
    }

    /// Current in-window calls, oldest first
    fn current_calls(&self, now: i64) -> Vec<i64> {
        let mut calls = match self.store.get(&self.storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<i64>>(&raw) {
                Ok(calls) => calls,
                Err(e) => {
                    tracing::warn!("Rate record is corrupt, resetting: {}", e);
                    if let Err(e) = self.store.remove(&self.storage_key) {
                        tracing::warn!("Failed to reset rate record: {}", e);
                    }
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Rate record unreadable, using local mirror: {}", e);
                self.mirror.lock().clone()
            }
        };

        calls.retain(|&t| now - t < self.settings.window_ms);
        calls.sort_unstable();
        *self.mirror.lock() = calls.clone();
        calls
    }

    /// Consume a slot if one is free
    ///
    /// A denial leaves every piece of state untouched.
    pub fn can_make_call(&self) -> RateDecision {
        let now = now_ms();
        let mut calls = self.current_calls(now);

        if calls.len() >= self.settings.max_calls {
            let oldest = calls.first().copied().unwrap_or(now);
            let remaining_ms = (self.settings.window_ms - (now - oldest)).max(0);
            let wait_time = (remaining_ms as u64).div_ceil(1000).max(1);
            tracing::info!(
                calls = calls.len(),
                max = self.settings.max_calls,
                wait_time,
                "Rate limit reached"
            );
            return RateDecision::denied(wait_time);
        }

        calls.push(now);
        self.persist(&calls);
        *self.mirror.lock() = calls;

        if let Some(channel) = &self.channel {
            channel.post(&CallNotice::Call { timestamp: now });
        }
        RateDecision::allowed()
    }

    /// Slots left in the current window; consumes nothing
    pub fn remaining_calls(&self) -> usize {
        let calls = self.current_calls(now_ms());
        self.settings.max_calls.saturating_sub(calls.len())
    }

    /// Forget every recorded call, here and in the shared store
    pub fn reset(&self) {
        self.mirror.lock().clear();
        if let Err(e) = self.store.remove(&self.storage_key) {
            tracing::warn!("Failed to clear rate record: {}", e);
        }
    }

    /// Stop following sibling calls; the governor keeps working from the store
    pub fn destroy(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }

    fn persist(&self, calls: &[i64]) {
        let result = serde_json::to_string(calls)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .set(&self.storage_key, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            tracing::warn!("Failed to persist rate record: {}", e);
        }
    }
}

impl Drop for RateGovernor {
    fn drop(&mut self) {
        self.destroy();
    }
}
