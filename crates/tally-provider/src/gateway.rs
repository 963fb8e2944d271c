// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered-candidate fallback over the provider fleet.
//!
//! The candidate list is explicit: the preferred provider first, then
//! every other enabled provider that is not in an availability cooldown,
//! in the fixed `ProviderId::ALL` order. Each candidate gets its full
//! per-call retry budget; the first success wins and a total failure
//! aggregates every candidate's error.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::{
    AiResponse, ChatRequest, ProviderBackend, ProviderErrorKind, ProviderId, TallyError,
};
use tally_resilience::AvailabilityTracker;
use tracing::warn;

use crate::client::ProviderClient;

/// Fallback-aware entry point implementing [`ProviderBackend`].
pub struct ProviderGateway {
    client: ProviderClient,
    availability: Arc<AvailabilityTracker>,
}

impl ProviderGateway {
    pub fn new(client: ProviderClient, availability: Arc<AvailabilityTracker>) -> Self {
        Self {
            client,
            availability,
        }
    }

    /// Candidates in try order: preferred first, then remaining
    /// available providers.
    fn candidates(&self, preferred: Option<ProviderId>) -> Vec<ProviderId> {
        let mut order: Vec<ProviderId> = Vec::new();
        if let Some(preferred) = preferred {
            order.push(preferred);
        }
        for provider in ProviderId::ALL {
            if !order.contains(&provider) {
                order.push(provider);
            }
        }
        order
            .into_iter()
            .filter(|p| {
                self.client.providers().get(*p).enabled && self.availability.is_available(*p)
            })
            .collect()
    }

    /// Model used for a candidate: the explicit override applies only to
    /// the preferred provider; fallback candidates use their own
    /// configured default.
    fn model_for(&self, provider: ProviderId, request: &ChatRequest) -> String {
        if request.preferred == Some(provider)
            && let Some(ref model) = request.model
        {
            return model.clone();
        }
        self.client.providers().get(provider).default_model.clone()
    }
}

#[async_trait]
impl ProviderBackend for ProviderGateway {
    fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|p| {
                self.client.providers().get(*p).enabled && self.availability.is_available(*p)
            })
            .collect()
    }

    async fn call(
        &self,
        provider: ProviderId,
        request: &ChatRequest,
    ) -> Result<AiResponse, TallyError> {
        let model = self.model_for(provider, request);
        self.client
            .call(
                provider,
                &model,
                &request.messages,
                request.temperature,
                request.max_tokens,
                &request.user_id,
            )
            .await
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<AiResponse, TallyError> {
        let candidates = self.candidates(request.preferred);
        if candidates.is_empty() {
            return Err(TallyError::provider(
                ProviderErrorKind::Upstream,
                "no providers currently available",
            ));
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for provider in candidates {
            match self.call(provider, request).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    warn!(
                        provider = %provider,
                        error = %error,
                        "candidate failed, trying next provider"
                    );
                    failures.push(format!("{provider}: {error}"));
                }
            }
        }

        Err(TallyError::provider(
            ProviderErrorKind::Upstream,
            format!("all candidate providers failed: {}", failures.join("; ")),
        ))
    }
}
