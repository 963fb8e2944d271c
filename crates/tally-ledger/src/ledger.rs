// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The authoritative credit balance store.
//!
//! `deduct` is the single mutating entry point for debits. It runs one
//! IMMEDIATE SQLite transaction that replays recorded idempotency keys,
//! conditionally decrements the balance (`WHERE balance >= cost` -- never
//! a read-then-write), and appends the immutable transaction row. Grants
//! go through `add_credits`, an atomic upsert increment. All operations
//! flow through the single tokio-rusqlite writer thread; the conditional
//! SQL keeps them correct even when other processes share the database
//! file.

use rusqlite::{TransactionBehavior, params};
use tally_core::TallyError;
use tally_storage::Database;
use tracing::{debug, info};

use crate::types::{
    CreditTransaction, DeductReceipt, Eligibility, GrantReceipt, TransactionType,
};

/// Convert a tokio-rusqlite error into TallyError::Storage.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TallyError {
    TallyError::Storage {
        source: Box::new(e),
    }
}

fn iso_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Look up a previously recorded transaction by idempotency key.
fn find_recorded(
    conn: &rusqlite::Connection,
    key: &str,
) -> Result<Option<(String, i64, i64)>, rusqlite::Error> {
    let result = conn.query_row(
        "SELECT id, amount, balance_after FROM credit_transactions WHERE idempotency_key = ?1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    );
    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

enum DeductRow {
    Fresh { transaction_id: String, new_balance: i64 },
    Replayed { transaction_id: String, balance_after: i64 },
    Insufficient { available: i64 },
}

enum GrantRow {
    Fresh { new_balance: i64 },
    Replayed { balance_after: i64 },
}

/// Persistent credit ledger backed by the shared SQLite database.
pub struct CreditLedger {
    conn: tokio_rusqlite::Connection,
}

impl CreditLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }

    /// Current balance for a user; 0 when no balance row exists.
    pub async fn balance(&self, user_id: &str) -> Result<i64, TallyError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COALESCE((SELECT balance FROM credit_balances WHERE user_id = ?1), 0)",
                    params![user_id],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }

    /// Pure read: can this user afford an operation costing `required`?
    pub async fn check_eligibility(
        &self,
        user_id: &str,
        required: i64,
    ) -> Result<Eligibility, TallyError> {
        let available = self.balance(user_id).await?;
        let mut blockers = Vec::new();
        if available < required {
            blockers.push(format!(
                "insufficient credits: {required} required, {available} available"
            ));
        }
        Ok(Eligibility {
            can_use: available >= required,
            required,
            available,
            blockers,
        })
    }

    /// Atomically debit `cost` credits from `user_id`.
    ///
    /// The check-and-decrement happens in one conditional UPDATE inside
    /// an IMMEDIATE transaction, so concurrent deductions for the same
    /// user can never jointly overdraw the balance. A retried call with
    /// the same `idempotency_key` returns the recorded receipt without
    /// debiting twice.
    pub async fn deduct(
        &self,
        user_id: &str,
        cost: i64,
        idempotency_key: &str,
        description: &str,
    ) -> Result<DeductReceipt, TallyError> {
        if cost <= 0 {
            return Err(TallyError::Internal(format!(
                "deduction amount must be positive, got {cost}"
            )));
        }

        let user = user_id.to_string();
        let key = idempotency_key.to_string();
        let desc = description.to_string();
        let outcome = self
            .conn
            .call(move |conn| -> Result<DeductRow, rusqlite::Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                if let Some((id, _, balance_after)) = find_recorded(&tx, &key)? {
                    return Ok(DeductRow::Replayed {
                        transaction_id: id,
                        balance_after,
                    });
                }

                let now = iso_now();
                let updated = tx.execute(
                    "UPDATE credit_balances SET balance = balance - ?1, updated_at = ?2
                     WHERE user_id = ?3 AND balance >= ?1",
                    params![cost, now, user],
                )?;
                if updated == 0 {
                    let available: i64 = tx.query_row(
                        "SELECT COALESCE((SELECT balance FROM credit_balances WHERE user_id = ?1), 0)",
                        params![user],
                        |row| row.get(0),
                    )?;
                    return Ok(DeductRow::Insufficient { available });
                }

                let new_balance: i64 = tx.query_row(
                    "SELECT balance FROM credit_balances WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )?;
                let id = uuid::Uuid::new_v4().to_string();
                let inserted = tx.execute(
                    "INSERT INTO credit_transactions
                     (id, user_id, amount, tx_type, description, idempotency_key, balance_after, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        user,
                        -cost,
                        TransactionType::Usage.to_string(),
                        desc,
                        key,
                        new_balance,
                        now,
                    ],
                );
                match inserted {
                    Ok(_) => {
                        tx.commit()?;
                        Ok(DeductRow::Fresh {
                            transaction_id: id,
                            new_balance,
                        })
                    }
                    Err(err) if is_unique_violation(&err) => {
                        // Another writer recorded the same key first; undo
                        // our decrement and echo its result.
                        tx.rollback()?;
                        match find_recorded(conn, &key)? {
                            Some((id, _, balance_after)) => Ok(DeductRow::Replayed {
                                transaction_id: id,
                                balance_after,
                            }),
                            None => Err(err),
                        }
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            DeductRow::Fresh {
                transaction_id,
                new_balance,
            } => {
                info!(
                    user_id,
                    cost,
                    new_balance,
                    idempotency_key,
                    transaction_id = %transaction_id,
                    "credits deducted"
                );
                Ok(DeductReceipt {
                    credits_cost: cost,
                    new_balance,
                    transaction_id,
                    replayed: false,
                })
            }
            DeductRow::Replayed {
                transaction_id,
                balance_after,
            } => {
                debug!(
                    user_id,
                    idempotency_key,
                    transaction_id = %transaction_id,
                    "deduction replayed from recorded transaction"
                );
                Ok(DeductReceipt {
                    credits_cost: cost,
                    new_balance: balance_after,
                    transaction_id,
                    replayed: true,
                })
            }
            DeductRow::Insufficient { available } => Err(TallyError::InsufficientBalance {
                required: cost,
                available,
            }),
        }
    }

    /// Atomically credit `amount` to `user_id`.
    ///
    /// The balance row is upserted with an in-database increment, never a
    /// read-modify-write in application code. When `idempotency_key` is
    /// set (billing events, trial grants), a replay returns the recorded
    /// balance instead of crediting twice.
    pub async fn add_credits(
        &self,
        user_id: &str,
        amount: i64,
        tx_type: TransactionType,
        description: &str,
        idempotency_key: Option<String>,
    ) -> Result<GrantReceipt, TallyError> {
        if amount <= 0 {
            return Err(TallyError::Internal(format!(
                "grant amount must be positive, got {amount}"
            )));
        }

        let user = user_id.to_string();
        let desc = description.to_string();
        let key = idempotency_key.clone();
        let outcome = self
            .conn
            .call(move |conn| -> Result<GrantRow, rusqlite::Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                if let Some(ref key) = key
                    && let Some((_, _, balance_after)) = find_recorded(&tx, key)?
                {
                    return Ok(GrantRow::Replayed { balance_after });
                }

                let now = iso_now();
                tx.execute(
                    "INSERT INTO credit_balances (user_id, balance, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET
                         balance = balance + excluded.balance,
                         updated_at = excluded.updated_at",
                    params![user, amount, now],
                )?;
                let new_balance: i64 = tx.query_row(
                    "SELECT balance FROM credit_balances WHERE user_id = ?1",
                    params![user],
                    |row| row.get(0),
                )?;
                let id = uuid::Uuid::new_v4().to_string();
                let inserted = tx.execute(
                    "INSERT INTO credit_transactions
                     (id, user_id, amount, tx_type, description, idempotency_key, balance_after, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        id,
                        user,
                        amount,
                        tx_type.to_string(),
                        desc,
                        key,
                        new_balance,
                        now,
                    ],
                );
                match inserted {
                    Ok(_) => {
                        tx.commit()?;
                        Ok(GrantRow::Fresh { new_balance })
                    }
                    Err(err) if is_unique_violation(&err) => {
                        tx.rollback()?;
                        match key.as_deref().map(|k| find_recorded(conn, k)).transpose()? {
                            Some(Some((_, _, balance_after))) => {
                                Ok(GrantRow::Replayed { balance_after })
                            }
                            _ => Err(err),
                        }
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            GrantRow::Fresh { new_balance } => {
                info!(
                    user_id,
                    amount,
                    new_balance,
                    tx_type = %tx_type,
                    "credits added"
                );
                Ok(GrantReceipt {
                    new_balance,
                    replayed: false,
                })
            }
            GrantRow::Replayed { balance_after } => {
                debug!(user_id, tx_type = %tx_type, "grant replayed, no credits moved");
                Ok(GrantReceipt {
                    new_balance: balance_after,
                    replayed: true,
                })
            }
        }
    }

    /// Grant the one-time trial allotment for a new user.
    ///
    /// The key is deterministic per user, so a replayed signup can never
    /// double-grant.
    pub async fn grant_trial(&self, user_id: &str, credits: i64) -> Result<GrantReceipt, TallyError> {
        self.add_credits(
            user_id,
            credits,
            TransactionType::Trial,
            "trial signup grant",
            Some(format!("trial:{user_id}")),
        )
        .await
    }

    /// Most recent transactions for a user, newest first.
    pub async fn transactions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditTransaction>, TallyError> {
        let user_id = user_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, amount, tx_type, description, idempotency_key,
                            balance_after, created_at
                     FROM credit_transactions
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![user_id, limit as i64], |row| {
                    use std::str::FromStr;
                    let type_str: String = row.get(3)?;
                    let tx_type = TransactionType::from_str(&type_str).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?;
                    Ok(CreditTransaction {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        amount: row.get(2)?,
                        tx_type,
                        description: row.get(4)?,
                        idempotency_key: row.get(5)?,
                        balance_after: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn ledger() -> CreditLedger {
        let db = Database::open_in_memory().await.unwrap();
        CreditLedger::new(&db)
    }

    #[tokio::test]
    async fn eligibility_and_deduct_happy_path() {
        // Balance 5, cost 1: eligible, then balance 4 with one -1 row.
        let ledger = ledger().await;
        ledger
            .add_credits("user-1", 5, TransactionType::Purchase, "pack", None)
            .await
            .unwrap();

        let eligibility = ledger.check_eligibility("user-1", 1).await.unwrap();
        assert!(eligibility.can_use);
        assert_eq!(eligibility.required, 1);
        assert_eq!(eligibility.available, 5);
        assert!(eligibility.blockers.is_empty());

        let receipt = ledger
            .deduct("user-1", 1, "k-1", "scholar turn")
            .await
            .unwrap();
        assert_eq!(receipt.new_balance, 4);
        assert!(!receipt.replayed);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 4);

        let log = ledger.transactions("user-1", 10).await.unwrap();
        let debits: Vec<_> = log.iter().filter(|t| t.amount < 0).collect();
        assert_eq!(debits.len(), 1);
        assert_eq!(debits[0].amount, -1);
        assert_eq!(debits[0].tx_type, TransactionType::Usage);
        assert_eq!(debits[0].balance_after, 4);
    }

    #[tokio::test]
    async fn deduct_with_zero_balance_fails_cleanly() {
        let ledger = ledger().await;
        let err = ledger
            .deduct("user-broke", 1, "k-1", "turn")
            .await
            .unwrap_err();
        match err {
            TallyError::InsufficientBalance {
                required,
                available,
            } => {
                assert_eq!(required, 1);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientBalance, got {other}"),
        }
        assert_eq!(ledger.balance("user-broke").await.unwrap(), 0);
        assert!(
            ledger
                .transactions("user-broke", 10)
                .await
                .unwrap()
                .is_empty(),
            "a failed deduction must not create a transaction"
        );
    }

    #[tokio::test]
    async fn replayed_key_returns_identical_receipt_once() {
        let ledger = ledger().await;
        ledger
            .add_credits("user-1", 3, TransactionType::Purchase, "pack", None)
            .await
            .unwrap();

        let first = ledger.deduct("user-1", 1, "same-key", "turn").await.unwrap();
        let second = ledger.deduct("user-1", 1, "same-key", "turn").await.unwrap();

        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(first.new_balance, second.new_balance);
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 2, "debited once");

        let rows = ledger.transactions("user-1", 10).await.unwrap();
        let debits = rows.iter().filter(|t| t.amount < 0).count();
        assert_eq!(debits, 1, "exactly one transaction row for the key");
    }

    #[tokio::test]
    async fn concurrent_deducts_never_overdraw() {
        // Balance covers exactly 3 deductions; 8 concurrent attempts with
        // distinct keys must yield exactly 3 successes and a final
        // balance of zero.
        let ledger = Arc::new(ledger().await);
        ledger
            .add_credits("user-1", 3, TransactionType::Purchase, "pack", None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.deduct("user-1", 1, &format!("key-{i}"), "turn").await
            }));
        }

        let mut successes = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    assert!(receipt.new_balance >= 0);
                    successes += 1;
                }
                Err(TallyError::InsufficientBalance { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(insufficient, 5);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn two_racing_deducts_on_one_credit() {
        let ledger = Arc::new(ledger().await);
        ledger
            .add_credits("user-1", 1, TransactionType::Topup, "topup", None)
            .await
            .unwrap();

        let a = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.deduct("user-1", 1, "key-a", "turn").await })
        };
        let b = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.deduct("user-1", 1, "key-b", "turn").await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(TallyError::InsufficientBalance { .. })))
            .count();
        assert_eq!(ok, 1, "exactly one of two racing deducts succeeds");
        assert_eq!(insufficient, 1);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn grants_accumulate_and_log() {
        let ledger = ledger().await;
        ledger
            .add_credits("user-1", 10, TransactionType::Purchase, "starter", None)
            .await
            .unwrap();
        let receipt = ledger
            .add_credits("user-1", 5, TransactionType::Subscription, "monthly", None)
            .await
            .unwrap();
        assert_eq!(receipt.new_balance, 15);

        let rows = ledger.transactions("user-1", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| t.amount > 0));
    }

    #[tokio::test]
    async fn keyed_grant_deduplicates() {
        let ledger = ledger().await;
        let first = ledger
            .add_credits(
                "user-1",
                50,
                TransactionType::Purchase,
                "checkout",
                Some("billing:evt_123".to_string()),
            )
            .await
            .unwrap();
        let replay = ledger
            .add_credits(
                "user-1",
                50,
                TransactionType::Purchase,
                "checkout",
                Some("billing:evt_123".to_string()),
            )
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(replay.replayed);
        assert_eq!(replay.new_balance, first.new_balance);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 50);
    }

    #[tokio::test]
    async fn trial_grant_is_once_per_user() {
        let ledger = ledger().await;
        let first = ledger.grant_trial("user-1", 25).await.unwrap();
        let again = ledger.grant_trial("user-1", 25).await.unwrap();
        assert!(!first.replayed);
        assert!(again.replayed);
        assert_eq!(ledger.balance("user-1").await.unwrap(), 25);
    }

    #[tokio::test]
    async fn non_positive_amounts_rejected() {
        let ledger = ledger().await;
        assert!(ledger.deduct("u", 0, "k", "d").await.is_err());
        assert!(
            ledger
                .add_credits("u", -5, TransactionType::Topup, "d", None)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn ineligible_user_gets_blockers() {
        let ledger = ledger().await;
        ledger
            .add_credits("user-1", 1, TransactionType::Trial, "trial", None)
            .await
            .unwrap();
        let eligibility = ledger.check_eligibility("user-1", 2).await.unwrap();
        assert!(!eligibility.can_use);
        assert_eq!(eligibility.available, 1);
        assert_eq!(eligibility.blockers.len(), 1);
        // The check itself must not mutate anything.
        assert_eq!(ledger.balance("user-1").await.unwrap(), 1);
    }
}
