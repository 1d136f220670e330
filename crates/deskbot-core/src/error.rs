//! Error taxonomy shared by every component
//!
//! Callers branch on a single enum. Refusals (format, crypto, prompt, rate)
//! are produced before any network call; provider-side failures are
//! normalized at the orchestrator boundary.

use std::fmt;

use crate::guard::ThreatFinding;

/// Errors surfaced by the deskbot core
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Credential failed a format check
    #[error("invalid API key format ({check}): {message}")]
    Format { check: String, message: String },

    /// Stored ciphertext is corrupt, tampered with, or derived with another key
    #[error("credential decryption failed: {0}")]
    CredentialCrypto(String),

    /// No credential has been saved (or it expired)
    #[error("no API key configured")]
    NoCredential,

    /// Call budget for the current window is spent
    #[error("rate limit exceeded, retry in {wait_time}s")]
    RateLimitExceeded { wait_time: u64 },

    /// Injection analysis rejected the text; it was never forwarded
    #[error("message rejected by the prompt guard ({} finding(s))", findings.len())]
    PromptRejected { findings: Vec<ThreatFinding> },

    /// Provider answered with a non-success HTTP status
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider call exceeded its deadline and was aborted
    #[error("provider request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Provider answered 2xx but the envelope had no usable text
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Transport-level failure before a response arrived
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Persistent store could not be read or written
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Flat classification of [`DeskError`], convenient for matching and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    CredentialCrypto,
    NoCredential,
    RateLimited,
    PromptRejected,
    Provider,
    Timeout,
    MalformedResponse,
    Network,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Format => "format",
            ErrorKind::CredentialCrypto => "credential_crypto",
            ErrorKind::NoCredential => "no_credential",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::PromptRejected => "prompt_rejected",
            ErrorKind::Provider => "provider",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Network => "network",
            ErrorKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

impl DeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeskError::Format { .. } => ErrorKind::Format,
            DeskError::CredentialCrypto(_) => ErrorKind::CredentialCrypto,
            DeskError::NoCredential => ErrorKind::NoCredential,
            DeskError::RateLimitExceeded { .. } => ErrorKind::RateLimited,
            DeskError::PromptRejected { .. } => ErrorKind::PromptRejected,
            DeskError::Provider { .. } => ErrorKind::Provider,
            DeskError::Timeout { .. } => ErrorKind::Timeout,
            DeskError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            DeskError::Network { .. } => ErrorKind::Network,
            DeskError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status attached to the failure, if the provider answered
    pub fn status(&self) -> Option<u16> {
        match self {
            DeskError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn network(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DeskError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Text suitable for showing to help-desk staff
    pub fn user_message(&self) -> String {
        match self {
            DeskError::Format { message, .. } => format!("That API key looks wrong: {message}"),
            DeskError::CredentialCrypto(_) => {
                "The saved API key could not be unlocked. Clear it and enter it again.".to_string()
            }
            DeskError::NoCredential => {
                "No API key is configured. Add one with `deskbot key set`.".to_string()
            }
            DeskError::RateLimitExceeded { wait_time } => {
                format!("Too many requests. Please wait {wait_time} second(s) before asking again.")
            }
            DeskError::PromptRejected { .. } => {
                "Your message was blocked because it looks like an attempt to change the assistant's instructions. Please rephrase your question.".to_string()
            }
            DeskError::Provider { status: 401 | 403, .. } => {
                "The provider refused the API key. Check that it is valid and enabled.".to_string()
            }
            DeskError::Provider { status: 429, .. } => {
                "The provider quota is exhausted. Try again later.".to_string()
            }
            DeskError::Provider { status, .. } => {
                format!("The assistant service returned an error (HTTP {status}). Please try again.")
            }
            DeskError::Timeout { .. } | DeskError::Network { .. } => {
                "The assistant could not be reached. Check your connection and try again.".to_string()
            }
            DeskError::MalformedResponse(_) => {
                "The assistant returned an empty answer. Please try again.".to_string()
            }
            DeskError::Storage(_) => "Local storage is unavailable.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status() {
        let err = DeskError::Provider {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.status(), Some(503));
        assert_eq!(DeskError::Timeout { timeout_ms: 10 }.status(), None);
    }

    #[test]
    fn rate_limit_message_carries_wait_time() {
        let err = DeskError::RateLimitExceeded { wait_time: 42 };
        assert!(err.user_message().contains("42"));
        assert_eq!(err.kind().to_string(), "rate_limited");
    }

    #[test]
    fn network_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DeskError::network("connect failed", io);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("refused"));
    }
}
