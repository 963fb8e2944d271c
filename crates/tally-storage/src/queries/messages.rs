// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history queries. The table is append-only; rows are
//! never updated or deleted.

use std::str::FromStr;

use rusqlite::params;
use tally_core::TallyError;
use tally_core::types::{ConversationMessage, Role};

use crate::database::{Database, map_tr_err};

/// Append one message to the conversation history.
pub async fn append_message(db: &Database, message: &ConversationMessage) -> Result<(), TallyError> {
    let message = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_messages (id, session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.session_id,
                    message.role.to_string(),
                    message.content,
                    message.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent `limit` messages for a session, oldest first.
pub async fn recent_messages(
    db: &Database,
    session_id: &str,
    limit: usize,
) -> Result<Vec<ConversationMessage>, TallyError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, created_at
                 FROM conversation_messages
                 WHERE session_id = ?1
                 ORDER BY rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit as i64], |row| {
                let role_str: String = row.get(2)?;
                let role = Role::from_str(&role_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        2,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(ConversationMessage {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut messages = rows.collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}
