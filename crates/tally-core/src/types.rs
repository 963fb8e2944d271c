// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Tally workspace.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One of the supported upstream LLM vendors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderId {
    /// All known providers, in default fallback order.
    pub const ALL: [ProviderId; 3] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
    ];
}

/// Role of a chat message author.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in the normalized chat format sent to providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A normalized request for one agent-quality completion.
///
/// `preferred` names the provider tried first; the backend may fall back
/// to other available providers. `model` overrides the preferred
/// provider's default model and is ignored by fallback candidates, which
/// always use their own configured defaults.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub preferred: Option<ProviderId>,
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub user_id: String,
}

/// A normalized response from one provider call attempt.
///
/// Produced once per attempt and never mutated afterwards. `provider`
/// and `model` are display strings so synthesized fallback responses can
/// carry labels that do not correspond to a real vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub provider: String,
    pub model: String,
    pub content: String,
    /// Heuristic quality estimate, clamped to [0.10, 0.95].
    pub confidence: f64,
    pub tokens: u32,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A persisted conversation history entry. Append-only; never mutated
/// once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// ISO 8601 timestamp.
    pub created_at: String,
}
