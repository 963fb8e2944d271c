// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, auth middleware, and shared state.

use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tally_agent::{AgentOrchestrator, MultiQueryProcessor};
use tally_core::TallyError;
use tally_ledger::CreditLedger;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AgentOrchestrator>,
    pub processor: Arc<MultiQueryProcessor>,
    pub ledger: Arc<CreditLedger>,
    pub auth: AuthConfig,
    /// Credits granted for a trial signup when the event names none.
    pub trial_credits: i64,
    /// Process start time for uptime reporting.
    pub start_time: std::time::Instant,
}

/// Gateway server configuration (mirrors `GatewayConfig` from tally-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the full route tree.
///
/// `/health` is public (process supervisors poll it); everything under
/// `/v1` requires bearer auth.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/agents/{agent_id}/turns", post(handlers::post_agent_turn))
        .route(
            "/v1/agents/{agent_id}/eligibility",
            get(handlers::get_agent_eligibility),
        )
        .route("/v1/queries", post(handlers::post_query))
        .route("/v1/users/{user_id}/credits", get(handlers::get_user_credits))
        .route("/v1/billing/events", post(handlers::post_billing_event))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process exits.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), TallyError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TallyError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| TallyError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tally_agent::AgentCatalog;
    use tally_core::{
        AiResponse, ChatRequest, ProviderBackend, ProviderErrorKind, ProviderId,
    };
    use tally_ledger::TransactionType;
    use tally_storage::Database;
    use tower::ServiceExt;

    struct CannedBackend {
        content: Option<String>,
    }

    #[async_trait]
    impl ProviderBackend for CannedBackend {
        fn available_providers(&self) -> Vec<ProviderId> {
            ProviderId::ALL.to_vec()
        }

        async fn call(
            &self,
            _provider: ProviderId,
            request: &ChatRequest,
        ) -> Result<AiResponse, TallyError> {
            self.invoke(request).await
        }

        async fn invoke(&self, _request: &ChatRequest) -> Result<AiResponse, TallyError> {
            match &self.content {
                Some(content) => Ok(AiResponse {
                    provider: "openai".to_string(),
                    model: "gpt-4o-mini".to_string(),
                    content: content.clone(),
                    confidence: 0.8,
                    tokens: 7,
                    response_time_ms: 3,
                    error: None,
                }),
                None => Err(TallyError::provider(ProviderErrorKind::Upstream, "down")),
            }
        }
    }

    async fn test_state(content: Option<&str>) -> (AppState, Arc<CreditLedger>) {
        let db = Database::open_in_memory().await.unwrap();
        let ledger = Arc::new(CreditLedger::new(&db));
        let backend: Arc<dyn ProviderBackend> = Arc::new(CannedBackend {
            content: content.map(str::to_string),
        });
        let orchestrator = Arc::new(AgentOrchestrator::new(
            AgentCatalog::from_config(&[]),
            Arc::clone(&ledger),
            Arc::clone(&backend),
            db,
            None,
        ));
        let processor = Arc::new(MultiQueryProcessor::new(backend));
        (
            AppState {
                orchestrator,
                processor,
                ledger: Arc::clone(&ledger),
                auth: AuthConfig {
                    bearer_token: Some("test-token".to_string()),
                },
                trial_credits: 25,
                start_time: std::time::Instant::now(),
            },
            ledger,
        )
    }

    fn authed(request: axum::http::request::Builder) -> axum::http::request::Builder {
        request.header(header::AUTHORIZATION, "Bearer test-token")
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _) = test_state(Some("hi")).await;
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_reject_missing_token() {
        let (state, _) = test_state(Some("hi")).await;
        let response = router(state)
            .oneshot(
                Request::get("/v1/users/u1/credits")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn api_routes_reject_wrong_token() {
        let (state, _) = test_state(Some("hi")).await;
        let response = router(state)
            .oneshot(
                Request::get("/v1/users/u1/credits")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn turn_without_credits_is_a_402() {
        let (state, _) = test_state(Some("hi")).await;
        let body = serde_json::json!({"content": "hello", "user_id": "u1"});
        let response = router(state)
            .oneshot(
                authed(Request::post("/v1/agents/scholar/turns"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn funded_turn_answers_200() {
        let (state, ledger) = test_state(Some("the answer")).await;
        ledger
            .add_credits("u1", 10, TransactionType::Purchase, "pack", None)
            .await
            .unwrap();

        let body = serde_json::json!({"content": "hello", "user_id": "u1"});
        let response = router(state)
            .oneshot(
                authed(Request::post("/v1/agents/scholar/turns"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_agent_is_a_404() {
        let (state, _) = test_state(Some("hi")).await;
        let body = serde_json::json!({"content": "hello", "user_id": "u1"});
        let response = router(state)
            .oneshot(
                authed(Request::post("/v1/agents/ghost/turns"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn queries_always_answer_200_even_when_all_providers_fail() {
        let (state, _) = test_state(None).await;
        let body = serde_json::json!({"query": "compare things"});
        let response = router(state)
            .oneshot(
                authed(Request::post("/v1/queries"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn billing_event_credits_and_replays() {
        let (state, ledger) = test_state(Some("hi")).await;
        let event = serde_json::json!({
            "id": "evt_1",
            "event_type": "checkout.completed",
            "user_id": "u1",
            "credits": 50
        });

        let app = router(state);
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    authed(Request::post("/v1/billing/events"))
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(event.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        // Redelivered event must not double-credit.
        assert_eq!(ledger.balance("u1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn trial_event_uses_configured_allotment_once_per_user() {
        let (state, ledger) = test_state(Some("hi")).await;
        let app = router(state);

        // Two distinct event ids for the same user: the trial key is per
        // user, so the second grant must replay.
        for event_id in ["evt_t1", "evt_t2"] {
            let event = serde_json::json!({
                "id": event_id,
                "event_type": "trial.started",
                "user_id": "u1"
            });
            let response = app
                .clone()
                .oneshot(
                    authed(Request::post("/v1/billing/events"))
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(event.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(ledger.balance("u1").await.unwrap(), 25);
    }

    #[tokio::test]
    async fn unsupported_billing_event_is_a_400() {
        let (state, _) = test_state(Some("hi")).await;
        let event = serde_json::json!({
            "id": "evt_2",
            "event_type": "invoice.voided",
            "user_id": "u1",
            "credits": 50
        });
        let response = router(state)
            .oneshot(
                authed(Request::post("/v1/billing/events"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
