// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test double for the provider backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tally_core::{
    AiResponse, ChatRequest, ProviderBackend, ProviderErrorKind, ProviderId, TallyError,
};

/// A provider backend with a FIFO queue of scripted outcomes.
///
/// Both `call` and `invoke` pop the same queue; an exhausted queue fails
/// with an upstream error so tests never hang on missing scripts.
pub(crate) struct MockBackend {
    available: Vec<ProviderId>,
    outcomes: Mutex<VecDeque<Result<AiResponse, &'static str>>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockBackend {
    pub(crate) fn new(outcomes: Vec<Result<AiResponse, &'static str>>) -> Self {
        Self::with_available(ProviderId::ALL.to_vec(), outcomes)
    }

    pub(crate) fn with_available(
        available: Vec<ProviderId>,
        outcomes: Vec<Result<AiResponse, &'static str>>,
    ) -> Self {
        Self {
            available,
            outcomes: Mutex::new(VecDeque::from(outcomes)),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Counter of all `call`/`invoke` invocations.
    pub(crate) fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Log of every request the backend saw.
    pub(crate) fn invoke_log(&self) -> Arc<Mutex<Vec<ChatRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Convenience builder for a plausible response.
    pub(crate) fn response(provider: &str, content: &str) -> AiResponse {
        AiResponse {
            provider: provider.to_string(),
            model: "mock-model".to_string(),
            content: content.to_string(),
            confidence: 0.8,
            tokens: 10,
            response_time_ms: 5,
            error: None,
        }
    }

    /// Like [`MockBackend::response`] with an explicit confidence.
    pub(crate) fn scored(provider: &str, content: &str, confidence: f64) -> AiResponse {
        AiResponse {
            confidence,
            ..Self::response(provider, content)
        }
    }

    fn next(&self, request: &ChatRequest) -> Result<AiResponse, TallyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("request log lock")
            .push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .expect("outcome queue lock")
            .pop_front();
        match outcome {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(TallyError::provider(ProviderErrorKind::Upstream, reason)),
            None => Err(TallyError::provider(
                ProviderErrorKind::Upstream,
                "mock outcome queue exhausted",
            )),
        }
    }
}

#[async_trait]
impl ProviderBackend for MockBackend {
    fn available_providers(&self) -> Vec<ProviderId> {
        self.available.clone()
    }

    async fn call(
        &self,
        _provider: ProviderId,
        request: &ChatRequest,
    ) -> Result<AiResponse, TallyError> {
        self.next(request)
    }

    async fn invoke(&self, request: &ChatRequest) -> Result<AiResponse, TallyError> {
        self.next(request)
    }
}
