// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn orchestration: check credits, deduct, invoke, respond.
//!
//! Each user turn walks a small state machine with four terminal states:
//!
//! - `Paywall`: ineligible before any side effect; no deduction, no AI call.
//! - `CreditError`: the ledger failed; no AI call was made, so no credits
//!   were at risk. The user-facing message is distinct from AI failures
//!   so "we couldn't charge you" and "we charged you but AI failed" are
//!   distinguishable.
//! - `Fallback`: deduction succeeded but every provider failed. Credits
//!   remain deducted -- once debited, the attempt counts.
//! - `Answered`: the response is persisted into conversation history and
//!   returned.
//!
//! Raw upstream error text never reaches the user; every terminal state
//! carries a templated message.

use std::sync::Arc;

use serde::Serialize;
use strum::Display;
use tally_core::{
    AiResponse, ChatMessage, ChatRequest, ConversationMessage, ProviderBackend, TallyError,
};
use tally_ledger::{CreditLedger, Eligibility, idempotency_key};
use tally_notify::Notifier;
use tally_storage::Database;
use tally_storage::queries::messages;
use tracing::{error, info, warn};

use crate::catalog::AgentCatalog;

/// How much history rides along as context on each turn.
const HISTORY_LIMIT: usize = 20;

/// One inbound user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent_id: String,
    pub user_id: String,
    pub session_id: String,
    pub content: String,
    /// Caller-supplied context. When empty, the session's stored history
    /// is loaded instead.
    pub history: Vec<ChatMessage>,
    /// Caller pre-deducted at a higher layer; trust it and only log.
    pub skip_deduction: bool,
    /// Explicit model for the agent's preferred provider.
    pub model_override: Option<String>,
}

/// Terminal state of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TurnState {
    Answered,
    Paywall,
    CreditError,
    Fallback,
}

/// What the caller gets back from a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub state: TurnState,
    /// User-safe message: the answer, or a templated explanation.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AiResponse>,
    pub credits_charged: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Combines the catalog, ledger, and provider backend into single turns.
pub struct AgentOrchestrator {
    catalog: AgentCatalog,
    ledger: Arc<CreditLedger>,
    backend: Arc<dyn ProviderBackend>,
    db: Database,
    notifier: Option<Arc<Notifier>>,
}

impl AgentOrchestrator {
    pub fn new(
        catalog: AgentCatalog,
        ledger: Arc<CreditLedger>,
        backend: Arc<dyn ProviderBackend>,
        db: Database,
        notifier: Option<Arc<Notifier>>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            backend,
            db,
            notifier,
        }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Point-in-time eligibility for one agent: resolves the agent's
    /// pricing and delegates the balance read to the ledger.
    pub async fn check_eligibility(
        &self,
        agent_id: &str,
        user_id: &str,
    ) -> Result<Eligibility, TallyError> {
        let agent = self
            .catalog
            .get(agent_id)
            .ok_or_else(|| TallyError::UnknownAgent(agent_id.to_string()))?;
        self.ledger
            .check_eligibility(user_id, agent.credits_cost)
            .await
    }

    /// Run one full turn. Terminal states come back as `Ok(TurnOutcome)`;
    /// `Err` is reserved for requests that never entered the state
    /// machine (unknown agent).
    pub async fn respond(&self, request: TurnRequest) -> Result<TurnOutcome, TallyError> {
        let agent = self
            .catalog
            .get(&request.agent_id)
            .ok_or_else(|| TallyError::UnknownAgent(request.agent_id.clone()))?
            .clone();

        let mut credits_charged = 0;
        let mut balance = None;
        let mut transaction_id = None;

        if request.skip_deduction {
            // Deliberate trust boundary: the caller claims it already
            // deducted. Log it; never re-check or re-deduct here.
            info!(
                agent = %agent.id,
                user = %request.user_id,
                session = %request.session_id,
                "skip_deduction set by caller, trusting upstream deduction"
            );
        } else {
            let eligibility = match self
                .ledger
                .check_eligibility(&request.user_id, agent.credits_cost)
                .await
            {
                Ok(eligibility) => eligibility,
                Err(e) => {
                    error!(
                        agent = %agent.id,
                        user = %request.user_id,
                        session = %request.session_id,
                        error = %e,
                        "eligibility check failed"
                    );
                    return Ok(self.credit_error_outcome());
                }
            };
            if !eligibility.can_use {
                return Ok(Self::paywall_outcome(&eligibility));
            }

            // One key per logical attempt; internal retries of this turn
            // would reuse it and collapse in the ledger.
            let key = idempotency_key("agent-turn", &request.user_id, &request.session_id);
            match self
                .ledger
                .deduct(
                    &request.user_id,
                    agent.credits_cost,
                    &key,
                    &format!("{} turn", agent.id),
                )
                .await
            {
                Ok(receipt) => {
                    info!(
                        agent = %agent.id,
                        user = %request.user_id,
                        session = %request.session_id,
                        idempotency_key = %key,
                        transaction_id = %receipt.transaction_id,
                        new_balance = receipt.new_balance,
                        "turn deduction complete"
                    );
                    credits_charged = receipt.credits_cost;
                    balance = Some(receipt.new_balance);
                    transaction_id = Some(receipt.transaction_id);
                }
                Err(TallyError::InsufficientBalance {
                    required,
                    available,
                }) => {
                    // Lost the race between check and the atomic debit.
                    return Ok(Self::paywall_outcome(&Eligibility {
                        can_use: false,
                        required,
                        available,
                        blockers: vec!["insufficient credits".to_string()],
                    }));
                }
                Err(e) => {
                    error!(
                        agent = %agent.id,
                        user = %request.user_id,
                        session = %request.session_id,
                        idempotency_key = %key,
                        error = %e,
                        "deduction failed"
                    );
                    return Ok(self.credit_error_outcome());
                }
            }
        }

        let chat = self.build_chat_request(&agent, &request).await;
        match self.backend.invoke(&chat).await {
            Ok(response) => {
                self.persist_exchange(&request, &response).await;
                if let Some(notifier) = &self.notifier {
                    notifier.notify(format!(
                        "{} answered {} ({} credits)",
                        agent.name, request.user_id, credits_charged
                    ));
                }
                Ok(TurnOutcome {
                    state: TurnState::Answered,
                    message: response.content.clone(),
                    response: Some(response),
                    credits_charged,
                    balance,
                    transaction_id,
                })
            }
            Err(e) => {
                warn!(
                    agent = %agent.id,
                    user = %request.user_id,
                    session = %request.session_id,
                    error = %e,
                    "provider invocation failed after retries, credits not refunded"
                );
                Ok(TurnOutcome {
                    state: TurnState::Fallback,
                    message: fallback_message(&request.content),
                    response: None,
                    credits_charged,
                    balance,
                    transaction_id,
                })
            }
        }
    }

    async fn build_chat_request(
        &self,
        agent: &tally_config::model::AgentProfileConfig,
        request: &TurnRequest,
    ) -> ChatRequest {
        let history = if request.history.is_empty() {
            match messages::recent_messages(&self.db, &request.session_id, HISTORY_LIMIT).await {
                Ok(stored) => stored
                    .into_iter()
                    .map(|m| ChatMessage {
                        role: m.role,
                        content: m.content,
                    })
                    .collect(),
                Err(e) => {
                    warn!(
                        session = %request.session_id,
                        error = %e,
                        "history load failed, continuing with empty context"
                    );
                    Vec::new()
                }
            }
        } else {
            request.history.clone()
        };

        let mut chat_messages = Vec::with_capacity(history.len() + 2);
        chat_messages.push(ChatMessage::system(&agent.system_prompt));
        chat_messages.extend(history);
        chat_messages.push(ChatMessage::user(&request.content));

        ChatRequest {
            preferred: Some(agent.provider),
            model: request.model_override.clone().or_else(|| agent.model.clone()),
            messages: chat_messages,
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
            user_id: request.user_id.clone(),
        }
    }

    /// Persist both sides of the exchange. Failures are logged, not
    /// surfaced: the user already has their answer.
    async fn persist_exchange(&self, request: &TurnRequest, response: &AiResponse) {
        let now = iso_now();
        let user_message = ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: request.session_id.clone(),
            role: tally_core::Role::User,
            content: request.content.clone(),
            created_at: now.clone(),
        };
        let assistant_message = ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: request.session_id.clone(),
            role: tally_core::Role::Assistant,
            content: response.content.clone(),
            created_at: now,
        };
        for message in [user_message, assistant_message] {
            if let Err(e) = messages::append_message(&self.db, &message).await {
                warn!(
                    session = %request.session_id,
                    error = %e,
                    "failed to persist conversation message"
                );
            }
        }
    }

    fn paywall_outcome(eligibility: &Eligibility) -> TurnOutcome {
        TurnOutcome {
            state: TurnState::Paywall,
            message: format!(
                "This agent costs {} credits and your balance is {}. \
                 Add credits to continue.",
                eligibility.required, eligibility.available
            ),
            response: None,
            credits_charged: 0,
            balance: Some(eligibility.available),
            transaction_id: None,
        }
    }

    fn credit_error_outcome(&self) -> TurnOutcome {
        TurnOutcome {
            state: TurnState::CreditError,
            message: "We couldn't process your credits just now. \
                      You have not been charged -- please try again."
                .to_string(),
            response: None,
            credits_charged: 0,
            balance: None,
            transaction_id: None,
        }
    }
}

/// Apologetic template echoing the original query; shown when every
/// provider failed after a successful deduction.
fn fallback_message(query: &str) -> String {
    format!(
        "I'm sorry -- I couldn't reach an AI provider to answer \"{}\" right now. \
         Please try again in a moment.",
        excerpt(query)
    )
}

fn excerpt(query: &str) -> String {
    const MAX: usize = 200;
    if query.chars().count() <= MAX {
        query.to_string()
    } else {
        let cut: String = query.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

fn iso_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
