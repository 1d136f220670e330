//! Request orchestrator
//!
//! One exchange:
//! 1. validate the user message (rejection never reaches the network)
//! 2. append the sanitized user turn
//! 3. screen, sanitize and wrap any retrieved reference text
//! 4. build the payload and POST it under a hard deadline
//! 5. on success append the model turn and trim, on failure retract the user turn
//!
//! Exchanges on one orchestrator are serialized. Settings and credential are
//! snapshotted when an exchange starts, so `set_model` / `set_api_key` only
//! affect later exchanges.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use super::history::ConversationHistory;
use crate::ai::{self, ProviderRequest, Transport, Turn};
use crate::config::AiSettings;
use crate::error::DeskError;
use crate::guard::{analyze, sanitize, truncate, wrap_context, InjectionGuard};
use crate::vault::ApiKey;

pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    guard: InjectionGuard,
    settings: RwLock<AiSettings>,
    api_key: RwLock<Option<ApiKey>>,
    history: Mutex<ConversationHistory>,
    exchange: tokio::sync::Mutex<()>,
}

/// Reference text attached to one exchange
#[derive(Debug, Clone, Copy)]
enum Context<'a> {
    /// Raw text, analysed as a single block before use
    Unscreened(&'a str),
    /// Already screened document by document by the caller
    Vetted(&'a str),
}

impl RequestOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        guard: InjectionGuard,
        settings: AiSettings,
        api_key: Option<ApiKey>,
    ) -> Self {
        Self {
            transport,
            guard,
            history: Mutex::new(ConversationHistory::new(settings.history_cap)),
            settings: RwLock::new(settings),
            api_key: RwLock::new(api_key),
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one guarded exchange and return the model's answer
    ///
    /// `rag_context` is screened as a single block before it is wrapped.
    pub async fn send_message(
        &self,
        user_text: &str,
        system_prompt: &str,
        rag_context: Option<&str>,
    ) -> Result<String, DeskError> {
        self.run_exchange(user_text, system_prompt, rag_context.map(Context::Unscreened))
            .await
    }

    /// Same as [`send_message`](Self::send_message) for context the caller
    /// has already screened document by document. It is only wrapped.
    pub async fn send_message_with_vetted_context(
        &self,
        user_text: &str,
        system_prompt: &str,
        context: &str,
    ) -> Result<String, DeskError> {
        self.run_exchange(user_text, system_prompt, Some(Context::Vetted(context)))
            .await
    }

    async fn run_exchange(
        &self,
        user_text: &str,
        system_prompt: &str,
        context: Option<Context<'_>>,
    ) -> Result<String, DeskError> {
        let _exchange = self.exchange.lock().await;

        let check = self.guard.validate_user_message(user_text);
        if !check.valid {
            return Err(DeskError::PromptRejected {
                findings: check.threats,
            });
        }

        let settings = self.settings.read().clone();
        let api_key = self.api_key.read().clone().ok_or(DeskError::NoCredential)?;

        let user_turn = Turn::user(check.message);
        let turns = {
            let mut history = self.history.lock();
            history.push(user_turn.clone());
            history.turns().to_vec()
        };

        let system = match context.map(|c| self.prepare_context(c)) {
            Some(wrapped) if !wrapped.is_empty() => format!("{system_prompt}\n\n{wrapped}"),
            _ => system_prompt.to_string(),
        };

        let request = ProviderRequest {
            url: ai::endpoint(&settings.base_url, &settings.model),
            api_key,
            body: ai::build_request(&system, &turns, &settings),
        };

        match self.dispatch(request, settings.timeout_ms).await {
            Ok(text) => {
                let mut history = self.history.lock();
                history.push(Turn::model(text.clone()));
                history.trim();
                Ok(text)
            }
            Err(e) => {
                self.history.lock().retract(&user_turn);
                tracing::warn!(kind = %e.kind(), status = ?e.status(), "Exchange failed: {}", e);
                Err(e)
            }
        }
    }

    /// Unscreened text is analysed as a block; unsafe context is dropped, not fatal
    fn prepare_context(&self, context: Context<'_>) -> String {
        let context = match context {
            Context::Vetted(text) if text.trim().is_empty() => return String::new(),
            Context::Vetted(text) => return wrap_context(text),
            Context::Unscreened(text) => text,
        };
        if context.trim().is_empty() {
            return String::new();
        }

        let analysis = analyze(context);
        if !analysis.safe {
            tracing::warn!(
                score = analysis.score,
                findings = analysis.findings.len(),
                "Reference context dropped by prompt guard"
            );
            return String::new();
        }

        let cleaned = truncate(&sanitize(context), self.guard.settings().max_context);
        wrap_context(&cleaned)
    }

    async fn dispatch(&self, request: ProviderRequest, timeout_ms: u64) -> Result<String, DeskError> {
        let deadline = Duration::from_millis(timeout_ms);
        let response = match tokio::time::timeout(deadline, self.transport.post_json(request)).await {
            Err(_) => return Err(DeskError::Timeout { timeout_ms }),
            Ok(Err(e)) => return Err(DeskError::network("provider request failed", e)),
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            let message = ai::error_message(&response.body)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(DeskError::Provider {
                status: response.status,
                message,
            });
        }

        let body: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| DeskError::MalformedResponse(format!("body is not JSON: {e}")))?;
        ai::extract_text(&body)
            .ok_or_else(|| DeskError::MalformedResponse("no candidate text".to_string()))
    }

    /// Copy of the conversation so far
    pub fn history(&self) -> Vec<Turn> {
        self.history.lock().turns().to_vec()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn model(&self) -> String {
        self.settings.read().model.clone()
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        tracing::info!(model = %model, "Model changed");
        self.settings.write().model = model;
    }

    pub fn set_api_key(&self, api_key: Option<ApiKey>) {
        *self.api_key.write() = api_key;
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }
}
