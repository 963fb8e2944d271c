// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for upstream LLM providers.
//!
//! One [`ProviderClient`] serves all providers: it validates and
//! sanitizes the request, resolves a credential (with a single session
//! refresh on absence), applies the local rate-limit gate, and retries
//! transient failures with exponential backoff. Errors are classified
//! exactly once, where the HTTP status is known.

use std::sync::Arc;
use std::time::Duration;

use tally_config::model::{ProviderConfig, ProvidersConfig, RetryConfig};
use tally_core::{
    AiResponse, ChatMessage, IdentityProvider, ProviderErrorKind, ProviderId, TallyError,
};
use tally_resilience::{AvailabilityTracker, RateLimitTracker};
use tracing::{debug, warn};

use crate::{confidence, payload, redact, sanitize};

/// Map an HTTP status to the typed failure taxonomy.
///
/// 401/403 are auth failures (fatal), 429 is rate limiting (retryable),
/// 400 is the caller's fault (fatal), and everything else upstream
/// trouble (retryable).
fn classify_status(status: reqwest::StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        401 | 403 => ProviderErrorKind::Auth,
        429 => ProviderErrorKind::RateLimit,
        400 => ProviderErrorKind::Validation,
        _ => ProviderErrorKind::Upstream,
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

/// HTTP client for upstream provider communication.
pub struct ProviderClient {
    http: reqwest::Client,
    providers: ProvidersConfig,
    retry: RetryConfig,
    limits: Arc<RateLimitTracker>,
    availability: Arc<AvailabilityTracker>,
    identity: Arc<dyn IdentityProvider>,
}

impl ProviderClient {
    pub fn new(
        providers: ProvidersConfig,
        retry: RetryConfig,
        limits: Arc<RateLimitTracker>,
        availability: Arc<AvailabilityTracker>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, TallyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| TallyError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            providers,
            retry,
            limits,
            availability,
            identity,
        })
    }

    pub fn providers(&self) -> &ProvidersConfig {
        &self.providers
    }

    /// One logical provider call: validate, sanitize, authenticate, then
    /// attempt with retry/backoff up to the configured ceiling.
    ///
    /// Non-retryable failures abort immediately without consuming the
    /// remaining retry budget; auth failures also mark the provider
    /// unavailable.
    pub async fn call(
        &self,
        provider: ProviderId,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
        user_id: &str,
    ) -> Result<AiResponse, TallyError> {
        let pc = self.providers.get(provider);
        if !pc.enabled {
            return Err(TallyError::provider(
                ProviderErrorKind::Validation,
                format!("provider {provider} is disabled"),
            ));
        }

        // Validated before anything leaves the process (never sent upstream).
        if max_tokens == 0 || max_tokens > pc.max_tokens_ceiling {
            return Err(TallyError::provider(
                ProviderErrorKind::Validation,
                format!(
                    "max_tokens {max_tokens} outside (0, {}] for {provider}",
                    pc.max_tokens_ceiling
                ),
            ));
        }

        let messages = sanitize::sanitize_messages(messages, self.providers.max_message_chars);
        let credential = self.resolve_credential(provider, user_id).await?;

        let mut last_error: Option<TallyError> = None;
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                // base × 2^(n−1) after the nth failed attempt.
                let exponent = attempt.saturating_sub(2);
                let delay =
                    Duration::from_millis(self.retry.base_delay_ms.saturating_mul(1 << exponent));
                warn!(
                    provider = %provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying provider call after transient error"
                );
                tokio::time::sleep(delay).await;
            }

            if !self.limits.check(provider) {
                last_error = Some(TallyError::provider(
                    ProviderErrorKind::RateLimit,
                    format!("local request window for {provider} exhausted"),
                ));
                continue;
            }

            match self
                .send_once(provider, pc, &credential, model, &messages, temperature, max_tokens)
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) => {
                    if let TallyError::Provider { kind, ref message } = error {
                        if kind == ProviderErrorKind::Auth {
                            self.availability.mark_unavailable(provider, message);
                        }
                        if !kind.is_retryable() {
                            return Err(error);
                        }
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TallyError::provider(
                ProviderErrorKind::Upstream,
                format!("{provider} call failed after {} attempts", self.retry.max_attempts),
            )
        }))
    }

    /// Fetch the calling identity's credential, refreshing the session
    /// once before giving up.
    async fn resolve_credential(
        &self,
        provider: ProviderId,
        user_id: &str,
    ) -> Result<String, TallyError> {
        if let Some(credential) = self.identity.credential(provider, user_id).await?
            && !credential.is_empty()
        {
            return Ok(credential);
        }
        debug!(provider = %provider, "credential absent, attempting one session refresh");
        match self.identity.refresh(provider, user_id).await? {
            Some(credential) if !credential.is_empty() => Ok(credential),
            _ => Err(TallyError::provider(
                ProviderErrorKind::Auth,
                format!("no credential available for {provider}"),
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        provider: ProviderId,
        pc: &ProviderConfig,
        credential: &str,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<AiResponse, TallyError> {
        let started = std::time::Instant::now();
        let url = payload::request_url(provider, &pc.base_url, model, credential);
        let body = payload::build_request(provider, model, messages, temperature, max_tokens);

        let response = payload::apply_auth(provider, self.http.post(url).json(&body), credential)
            .send()
            .await
            .map_err(|e| {
                self.limits.record(provider, 0);
                TallyError::provider(
                    ProviderErrorKind::Upstream,
                    redact::redact(&format!("{provider} request failed: {e}")),
                )
            })?;

        let status = response.status();
        debug!(provider = %provider, status = %status, "provider response received");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            self.limits.record(provider, 0);
            let kind = classify_status(status);
            return Err(TallyError::provider(
                kind,
                redact::redact(&format!("{provider} returned {status}: {}", snippet(&text))),
            ));
        }

        let text = response.text().await.map_err(|e| {
            self.limits.record(provider, 0);
            TallyError::provider(
                ProviderErrorKind::Parse,
                format!("failed to read {provider} response body: {e}"),
            )
        })?;

        match payload::parse_response(provider, &text) {
            Ok((content, tokens)) if !content.trim().is_empty() => {
                self.limits.record(provider, tokens);
                Ok(AiResponse {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    confidence: confidence::score(&content, pc.confidence_baseline),
                    content,
                    tokens,
                    response_time_ms: started.elapsed().as_millis() as u64,
                    error: None,
                })
            }
            Ok(_) => {
                self.limits.record(provider, 0);
                Err(TallyError::provider(
                    ProviderErrorKind::Parse,
                    format!("{provider} returned 2xx with empty content"),
                ))
            }
            Err(reason) => {
                self.limits.record(provider, 0);
                Err(TallyError::provider(ProviderErrorKind::Parse, reason))
            }
        }
    }
}
