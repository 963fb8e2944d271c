// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ledger domain types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The reason credits moved.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Trial,
    Purchase,
    Subscription,
    Topup,
    Usage,
    Rollover,
}

/// Point-in-time answer to "can this user afford this operation".
///
/// Derived, never stored; computing it mutates nothing.
#[derive(Debug, Clone, Serialize)]
pub struct Eligibility {
    pub can_use: bool,
    pub required: i64,
    pub available: i64,
    pub blockers: Vec<String>,
}

/// Result of a successful (or replayed) deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeductReceipt {
    pub credits_cost: i64,
    pub new_balance: i64,
    pub transaction_id: String,
    /// True when the idempotency key matched a prior deduction and this
    /// receipt echoes the recorded result.
    pub replayed: bool,
}

/// Result of an additive grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantReceipt {
    pub new_balance: i64,
    /// True when the grant key matched a prior grant (e.g. a redelivered
    /// billing event) and no credits moved.
    pub replayed: bool,
}

/// One immutable row from the transaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    /// Signed amount: positive credits, negative debits.
    pub amount: i64,
    pub tx_type: TransactionType,
    pub description: String,
    pub idempotency_key: Option<String>,
    pub balance_after: i64,
    /// ISO 8601 timestamp.
    pub created_at: String,
}
