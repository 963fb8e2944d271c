// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credit ledger for the Tally agent service.
//!
//! Exposes atomic "check eligibility" and "deduct" operations keyed by an
//! idempotency token, plus additive grants for purchases, trials, and
//! rollovers. The SQLite layer (`tally-storage`) supplies the schema; this
//! crate owns every mutation of it.

pub mod keys;
pub mod ledger;
pub mod types;

pub use keys::idempotency_key;
pub use ledger::CreditLedger;
pub use types::{
    CreditTransaction, DeductReceipt, Eligibility, GrantReceipt, TransactionType,
};
