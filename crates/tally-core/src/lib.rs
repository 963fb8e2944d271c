// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally credit-metered agent service.
//!
//! Provides the error taxonomy, normalized chat/response types, and the
//! trait seams (`ProviderBackend`, `IdentityProvider`) that let the
//! orchestration layer be tested without network access.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ProviderErrorKind, TallyError};
pub use traits::{IdentityProvider, ProviderBackend};
pub use types::{AiResponse, ChatMessage, ChatRequest, ConversationMessage, ProviderId, Role};
