//! Conversation wire types

use serde::{Deserialize, Serialize};

/// Speaker of a turn, named as the provider expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One message in the rolling conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }

    /// Provider `contents[]` entry
    pub fn to_content(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role,
            "parts": [{ "text": self.text }]
        })
    }
}
