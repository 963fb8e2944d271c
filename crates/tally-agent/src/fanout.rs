// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-provider query processing.
//!
//! Queries up to three available providers concurrently for the same
//! question (no personality prompt), keeps whatever subset succeeds, and
//! synthesizes one reported answer. When nothing succeeds the processor
//! returns a low-confidence fallback response instead of failing the
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tally_core::{AiResponse, ChatMessage, ChatRequest, ProviderBackend};
use tracing::{info, warn};

/// Fan-out ceiling per query.
const MAX_FANOUT_PROVIDERS: usize = 3;

/// Synthesis result returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// Providers that produced a response, in completion order.
    pub providers: Vec<String>,
    /// Every successful response.
    pub responses: Vec<AiResponse>,
    /// The selected best answer (or the synthesized fallback).
    pub best: AiResponse,
    /// Average confidence across all successful responses.
    pub confidence: f64,
    /// Top recurring words across all response bodies.
    pub themes: Vec<String>,
}

/// Concurrent fan-out over the available provider fleet.
pub struct MultiQueryProcessor {
    backend: Arc<dyn ProviderBackend>,
}

impl MultiQueryProcessor {
    pub fn new(backend: Arc<dyn ProviderBackend>) -> Self {
        Self { backend }
    }

    /// Query up to three available providers in parallel and synthesize
    /// a single best answer. Never fails: zero successes produce a
    /// low-confidence fallback.
    pub async fn process(
        &self,
        query: &str,
        history: &[ChatMessage],
        user_id: &str,
    ) -> QueryOutcome {
        let mut candidates = self.backend.available_providers();
        candidates.truncate(MAX_FANOUT_PROVIDERS);

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(query));

        let calls = candidates.into_iter().map(|provider| {
            let backend = Arc::clone(&self.backend);
            let request = ChatRequest {
                preferred: Some(provider),
                model: None,
                messages: messages.clone(),
                temperature: 0.7,
                max_tokens: 1024,
                user_id: user_id.to_string(),
            };
            async move { backend.call(provider, &request).await }
        });

        let results = futures::future::join_all(calls).await;
        let responses: Vec<AiResponse> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(response) => Some(response),
                Err(error) => {
                    warn!(error = %error, "fan-out candidate failed");
                    None
                }
            })
            .collect();

        if responses.is_empty() {
            warn!("all fan-out candidates failed, synthesizing fallback response");
            return Self::fallback_outcome(query);
        }

        let confidence =
            responses.iter().map(|r| r.confidence).sum::<f64>() / responses.len() as f64;
        let best = responses
            .iter()
            .max_by(|a, b| synthesis_score(a).total_cmp(&synthesis_score(b)))
            .cloned()
            .unwrap_or_else(|| responses[0].clone());
        let themes = common_themes(&responses);

        info!(
            providers = responses.len(),
            best_provider = %best.provider,
            confidence,
            "fan-out synthesis complete"
        );

        QueryOutcome {
            providers: responses.iter().map(|r| r.provider.clone()).collect(),
            responses,
            best,
            confidence,
            themes,
        }
    }

    fn fallback_outcome(query: &str) -> QueryOutcome {
        let excerpt: String = query.chars().take(200).collect();
        let best = AiResponse {
            provider: "fallback".to_string(),
            model: String::new(),
            content: format!(
                "I couldn't reach any AI provider for \"{excerpt}\" right now. \
                 Please try again shortly."
            ),
            confidence: 0.10,
            tokens: 0,
            response_time_ms: 0,
            error: Some("all providers unavailable".to_string()),
        };
        QueryOutcome {
            providers: Vec::new(),
            responses: Vec::new(),
            best,
            confidence: 0.10,
            themes: Vec::new(),
        }
    }
}

/// Ranking used to pick the reported best response.
fn synthesis_score(response: &AiResponse) -> f64 {
    0.7 * response.confidence + 0.3 * (response.content.len() as f64 / 1000.0)
}

/// Top-5 words (longer than 4 chars) appearing at least twice across all
/// response bodies combined. A frequency heuristic, not semantic analysis.
fn common_themes(responses: &[AiResponse]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for response in responses {
        for word in response.content.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.chars().count() > 4 {
                *counts.entry(word).or_default() += 1;
            }
        }
    }
    let mut themes: Vec<(String, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .collect();
    // Deterministic: count descending, then alphabetical.
    themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    themes.into_iter().take(5).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::MockBackend;
    use tally_core::ProviderId;

    #[tokio::test]
    async fn single_success_passes_through_unchanged() {
        let backend = MockBackend::with_available(
            vec![ProviderId::OpenAi],
            vec![Ok(MockBackend::scored("openai", "the only answer", 0.9))],
        );
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        let outcome = processor.process("question", &[], "user-1").await;
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(outcome.best.content, "the only answer");
        assert!((outcome.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn best_answer_maximizes_weighted_score() {
        // Same length, so confidence decides; then a long low-confidence
        // response shows the length term pulling its weight.
        let long = "x".repeat(2000);
        let backend = MockBackend::new(vec![
            Ok(MockBackend::scored("openai", "short but confident", 0.9)),
            Ok(MockBackend::scored("anthropic", &long, 0.4)),
            Ok(MockBackend::scored("gemini", "meh", 0.5)),
        ]);
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        let outcome = processor.process("question", &[], "user-1").await;
        // openai: 0.7*0.9 + 0.3*0.019 ≈ 0.636
        // anthropic: 0.7*0.4 + 0.3*2.0 = 0.88
        assert_eq!(outcome.best.provider, "anthropic");
        // Reported confidence is the average across all three.
        let expected = (0.9 + 0.4 + 0.5) / 3.0;
        assert!((outcome.confidence - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_successes_yield_low_confidence_fallback() {
        let backend = MockBackend::new(vec![
            Err("down"),
            Err("down"),
            Err("down"),
        ]);
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        let outcome = processor.process("what is rust", &[], "user-1").await;
        assert!(outcome.responses.is_empty());
        assert_eq!(outcome.best.provider, "fallback");
        assert!((outcome.confidence - 0.10).abs() < f64::EPSILON);
        assert!(outcome.best.content.contains("what is rust"));
        assert!(outcome.best.error.is_some());
    }

    #[tokio::test]
    async fn no_available_providers_also_falls_back() {
        let backend = MockBackend::with_available(vec![], vec![]);
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        let outcome = processor.process("hello", &[], "user-1").await;
        assert_eq!(outcome.best.provider, "fallback");
        assert!((outcome.confidence - 0.10).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn partial_failures_keep_the_successful_subset() {
        let backend = MockBackend::new(vec![
            Ok(MockBackend::scored("openai", "alpha answer", 0.8)),
            Err("anthropic down"),
            Ok(MockBackend::scored("gemini", "beta answer", 0.6)),
        ]);
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        let outcome = processor.process("question", &[], "user-1").await;
        assert_eq!(outcome.responses.len(), 2);
        assert_eq!(outcome.providers.len(), 2);
    }

    #[tokio::test]
    async fn each_available_provider_is_called_once() {
        let backend = MockBackend::new(vec![
            Ok(MockBackend::response("openai", "a")),
            Ok(MockBackend::response("anthropic", "b")),
            Ok(MockBackend::response("gemini", "c")),
        ]);
        let calls = backend.call_counter();
        let processor = MultiQueryProcessor::new(Arc::new(backend));

        processor.process("question", &[], "user-1").await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn themes_are_frequent_long_words() {
        let responses = vec![
            MockBackend::response("openai", "Rust ownership makes memory safety tractable"),
            MockBackend::response("anthropic", "Memory safety comes from ownership rules"),
            MockBackend::response("gemini", "ownership, borrowing and safety in Rust"),
        ];
        let themes = common_themes(&responses);
        assert!(themes.contains(&"ownership".to_string()), "got: {themes:?}");
        assert!(themes.contains(&"safety".to_string()), "got: {themes:?}");
        // "rust" has 4 chars, below the length cutoff.
        assert!(!themes.contains(&"rust".to_string()), "got: {themes:?}");
        assert!(themes.len() <= 5);
    }

    #[test]
    fn themes_require_two_occurrences() {
        let responses = vec![MockBackend::response(
            "openai",
            "singular appearance of everything here",
        )];
        assert!(common_themes(&responses).is_empty());
    }

    #[test]
    fn theme_punctuation_is_trimmed() {
        let responses = vec![
            MockBackend::response("openai", "Consider (borrowing)."),
            MockBackend::response("gemini", "More borrowing, always!"),
        ];
        let themes = common_themes(&responses);
        assert_eq!(themes, vec!["borrowing".to_string()]);
    }
}
