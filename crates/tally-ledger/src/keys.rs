// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Centralized idempotency-key construction.
//!
//! Every call site builds keys through this helper so the key shape can
//! never drift between callers. A key is unique per logical attempt --
//! the orchestrator generates one key per user action and reuses it
//! across its own internal retries, letting the ledger collapse
//! duplicates.

/// Build an idempotency key for a ledger operation.
///
/// Shape: `<operation>:<user_id>:<correlation_id>:<random suffix>`.
pub fn idempotency_key(operation: &str, user_id: &str, correlation_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{operation}:{user_id}:{correlation_id}:{}", &suffix[..12])
}
