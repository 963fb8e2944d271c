// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tally_agent::{TurnOutcome, TurnRequest, TurnState};
use tally_core::{ChatMessage, TallyError};
use tally_ledger::TransactionType;

use crate::server::AppState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// --- Agent turns ---

/// Request body for POST /v1/agents/{agent_id}/turns.
#[derive(Debug, Deserialize)]
pub struct TurnBody {
    pub content: String,
    pub user_id: String,
    /// Continue an existing session; a fresh one is created when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Explicit context; stored session history is used when empty.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Caller already deducted credits at a higher layer.
    #[serde(default)]
    pub skip_deduction: bool,
    /// Explicit model for the agent's preferred provider.
    #[serde(default)]
    pub model: Option<String>,
}

/// Response body for POST /v1/agents/{agent_id}/turns.
#[derive(Debug, Serialize)]
pub struct TurnReply {
    pub agent_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

/// POST /v1/agents/{agent_id}/turns
///
/// Runs one orchestrated agent turn. Paywall maps to 402 so billing UIs
/// can branch on status alone; a fallback answer is still a 200 because
/// the turn completed (and was charged).
pub async fn post_agent_turn(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<TurnBody>,
) -> Response {
    if body.content.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "content must not be empty");
    }

    let session_id = body
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = TurnRequest {
        agent_id: agent_id.clone(),
        user_id: body.user_id,
        session_id: session_id.clone(),
        content: body.content,
        history: body.history,
        skip_deduction: body.skip_deduction,
        model_override: body.model,
    };

    match state.orchestrator.respond(request).await {
        Ok(outcome) => {
            let status = match outcome.state {
                TurnState::Answered | TurnState::Fallback => StatusCode::OK,
                TurnState::Paywall => StatusCode::PAYMENT_REQUIRED,
                TurnState::CreditError => StatusCode::SERVICE_UNAVAILABLE,
            };
            (
                status,
                Json(TurnReply {
                    agent_id,
                    session_id,
                    outcome,
                    created_at: chrono::Utc::now().to_rfc3339(),
                }),
            )
                .into_response()
        }
        Err(TallyError::UnknownAgent(id)) => {
            error_response(StatusCode::NOT_FOUND, format!("unknown agent: {id}"))
        }
        Err(e) => {
            tracing::error!(error = %e, "turn failed before entering the state machine");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// --- Eligibility ---

#[derive(Debug, Deserialize)]
pub struct EligibilityParams {
    pub user_id: String,
}

/// GET /v1/agents/{agent_id}/eligibility?user_id=...
pub async fn get_agent_eligibility(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(params): Query<EligibilityParams>,
) -> Response {
    match state
        .orchestrator
        .check_eligibility(&agent_id, &params.user_id)
        .await
    {
        Ok(eligibility) => (StatusCode::OK, Json(eligibility)).into_response(),
        Err(TallyError::UnknownAgent(id)) => {
            error_response(StatusCode::NOT_FOUND, format!("unknown agent: {id}"))
        }
        Err(e) => {
            tracing::error!(error = %e, "eligibility check failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// --- Multi-provider queries ---

/// Request body for POST /v1/queries.
#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// POST /v1/queries
///
/// Fans the query out across available providers and returns the
/// synthesized result. Always 200: an all-provider failure still yields
/// a (low-confidence) fallback body.
pub async fn post_query(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    if body.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty");
    }
    let user_id = body.user_id.unwrap_or_else(|| "api-user".to_string());
    let outcome = state
        .processor
        .process(&body.query, &body.history, &user_id)
        .await;
    (StatusCode::OK, Json(outcome)).into_response()
}

// --- Credits ---

/// Response body for GET /v1/users/{user_id}/credits.
#[derive(Debug, Serialize)]
pub struct CreditsReply {
    pub user_id: String,
    pub balance: i64,
}

/// GET /v1/users/{user_id}/credits
pub async fn get_user_credits(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.ledger.balance(&user_id).await {
        Ok(balance) => (StatusCode::OK, Json(CreditsReply { user_id, balance })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "balance read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// --- Billing events ---

/// A successful-payment or subscription-lifecycle event from the billing
/// provider. Signature verification happened upstream; the event id is
/// the dedupe key.
#[derive(Debug, Deserialize)]
pub struct BillingEventBody {
    pub id: String,
    pub event_type: String,
    pub user_id: String,
    /// Credits to grant. Trial events may omit this to use the
    /// configured trial allotment.
    #[serde(default)]
    pub credits: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Response body for POST /v1/billing/events.
#[derive(Debug, Serialize)]
pub struct BillingEventReply {
    pub user_id: String,
    pub balance: i64,
    /// False when the event id was already processed.
    pub credited: bool,
}

fn transaction_type_for(event_type: &str) -> Option<TransactionType> {
    match event_type {
        "checkout.completed" | "payment.succeeded" => Some(TransactionType::Purchase),
        "subscription.created" | "subscription.renewed" => Some(TransactionType::Subscription),
        "topup.completed" => Some(TransactionType::Topup),
        "trial.started" => Some(TransactionType::Trial),
        "credits.rollover" => Some(TransactionType::Rollover),
        _ => None,
    }
}

/// POST /v1/billing/events
pub async fn post_billing_event(
    State(state): State<AppState>,
    Json(event): Json<BillingEventBody>,
) -> Response {
    let Some(tx_type) = transaction_type_for(&event.event_type) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("unsupported event type: {}", event.event_type),
        );
    };

    // Trials are keyed per user (never per event) and fall back to the
    // configured allotment, so a replayed signup can't double-grant.
    let result = if tx_type == TransactionType::Trial {
        let credits = if event.credits > 0 {
            event.credits
        } else {
            state.trial_credits
        };
        if credits <= 0 {
            return error_response(StatusCode::BAD_REQUEST, "credits must be positive");
        }
        state.ledger.grant_trial(&event.user_id, credits).await
    } else {
        if event.credits <= 0 {
            return error_response(StatusCode::BAD_REQUEST, "credits must be positive");
        }
        let description = event
            .description
            .unwrap_or_else(|| format!("billing event {}", event.event_type));
        state
            .ledger
            .add_credits(
                &event.user_id,
                event.credits,
                tx_type,
                &description,
                Some(format!("billing:{}", event.id)),
            )
            .await
    };

    match result {
        Ok(receipt) => (
            StatusCode::OK,
            Json(BillingEventReply {
                user_id: event.user_id,
                balance: receipt.new_balance,
                credited: !receipt.replayed,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "billing event processing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

// --- Health ---

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /health (unauthenticated, for process supervisors).
pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_body_deserializes_with_defaults() {
        let json = r#"{"content": "hi", "user_id": "u1"}"#;
        let body: TurnBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.content, "hi");
        assert!(body.session_id.is_none());
        assert!(body.history.is_empty());
        assert!(!body.skip_deduction);
        assert!(body.model.is_none());
    }

    #[test]
    fn turn_body_deserializes_all_fields() {
        let json = r#"{
            "content": "hi",
            "user_id": "u1",
            "session_id": "s1",
            "skip_deduction": true,
            "model": "gpt-4o"
        }"#;
        let body: TurnBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.session_id.as_deref(), Some("s1"));
        assert!(body.skip_deduction);
        assert_eq!(body.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn query_body_accepts_history() {
        let json = r#"{
            "query": "compare",
            "history": [{"role": "user", "content": "earlier"}]
        }"#;
        let body: QueryBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.history.len(), 1);
        assert!(body.user_id.is_none());
    }

    #[test]
    fn billing_event_types_map_to_transaction_types() {
        assert_eq!(
            transaction_type_for("checkout.completed"),
            Some(TransactionType::Purchase)
        );
        assert_eq!(
            transaction_type_for("subscription.renewed"),
            Some(TransactionType::Subscription)
        );
        assert_eq!(
            transaction_type_for("topup.completed"),
            Some(TransactionType::Topup)
        );
        assert_eq!(
            transaction_type_for("trial.started"),
            Some(TransactionType::Trial)
        );
        assert_eq!(
            transaction_type_for("credits.rollover"),
            Some(TransactionType::Rollover)
        );
        assert_eq!(transaction_type_for("invoice.voided"), None);
    }

    #[test]
    fn error_body_serializes() {
        let json = serde_json::to_string(&ErrorResponse {
            error: "boom".to_string(),
        })
        .unwrap();
        assert!(json.contains("boom"));
    }
}
