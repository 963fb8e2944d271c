// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the orchestration layer and its collaborators.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{AiResponse, ChatRequest, ProviderId};

/// Source of upstream credentials for the calling identity.
///
/// The provider gateway fetches a credential before each upstream call
/// and attempts exactly one `refresh` when the credential is absent or
/// expired before failing with an auth error.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current credential for `user_id` against `provider`, if any.
    async fn credential(
        &self,
        provider: ProviderId,
        user_id: &str,
    ) -> Result<Option<String>, TallyError>;

    /// Refresh the session and return a fresh credential, if possible.
    async fn refresh(
        &self,
        provider: ProviderId,
        user_id: &str,
    ) -> Result<Option<String>, TallyError>;
}

/// The orchestrator's view of the provider layer.
///
/// `invoke` applies the ordered-candidate fallback discipline; `call`
/// targets a single provider (used by the multi-provider fan-out, which
/// does its own candidate selection).
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// Providers that are enabled and not in an availability cooldown.
    fn available_providers(&self) -> Vec<ProviderId>;

    /// Issue one call to a specific provider, with per-call retries.
    async fn call(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
    ) -> Result<AiResponse, TallyError>;

    /// Try the preferred provider first, then each remaining available
    /// candidate, returning the first success or an aggregated failure.
    async fn invoke(&self, request: &ChatRequest) -> Result<AiResponse, TallyError>;
}
