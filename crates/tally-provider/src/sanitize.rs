// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound content hygiene.
//!
//! Strips obviously dangerous substrings from user-supplied content and
//! enforces the per-message length ceiling before anything leaves the
//! process. This is a defense-in-depth filter, not a full sanitizer:
//! anything that survives is still untrusted.

use std::sync::LazyLock;

use regex::Regex;
use tally_core::{ChatMessage, Role};

static SCRIPT_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<script\b[^>]*/?>").unwrap()
});

static EVENT_HANDLERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});

static DANGEROUS_URIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(?:javascript|data):[^\s"'<>]*"#).unwrap());

/// Remove script tags, inline event handlers, and `javascript:`/`data:`
/// URIs from a string.
pub fn scrub(content: &str) -> String {
    let content = SCRIPT_TAGS.replace_all(content, "");
    let content = EVENT_HANDLERS.replace_all(&content, "");
    DANGEROUS_URIS.replace_all(&content, "").into_owned()
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        content.chars().take(max_chars).collect()
    }
}

/// Apply the outbound hygiene rules to a message list.
///
/// User content is scrubbed; every message, regardless of role, is held
/// to the length ceiling.
pub fn sanitize_messages(messages: &[ChatMessage], max_chars: usize) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|message| {
            let content = if message.role == Role::User {
                scrub(&message.content)
            } else {
                message.content.clone()
            };
            ChatMessage {
                role: message.role,
                content: truncate_chars(&content, max_chars),
            }
        })
        .collect()
}
