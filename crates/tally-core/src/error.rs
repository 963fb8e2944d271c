// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally credit-metered agent service.

use strum::Display;
use thiserror::Error;

/// Classification of an upstream provider failure.
///
/// A failure is classified exactly once, at the HTTP boundary where the
/// status code is known. Downstream code branches on the variant, never
/// on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProviderErrorKind {
    /// 401/403 or a missing credential. Never retried; the provider is
    /// marked unavailable.
    Auth,
    /// 429 from upstream, or the local per-minute window is exhausted.
    RateLimit,
    /// 5xx upstream failure or a transport error.
    Upstream,
    /// Caller fault: bad payload, out-of-range `max_tokens`, disabled
    /// provider. Never retried, never sent upstream.
    Validation,
    /// A 2xx response whose body is empty or unparseable.
    Parse,
}

impl ProviderErrorKind {
    /// Whether a failure of this kind is worth retrying with backoff.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::RateLimit | ProviderErrorKind::Upstream | ProviderErrorKind::Parse
        )
    }
}

/// The primary error type used across all Tally crates.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing required fields).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Classified upstream LLM provider errors.
    #[error("provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    /// A deduction was attempted against a balance that cannot cover it.
    /// This is a user-facing paywall condition, not a system fault.
    #[error("insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },

    /// The requested agent personality does not exist in the catalog.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Shorthand for constructing a classified provider error.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        TallyError::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying with backoff.
    ///
    /// Only provider errors are ever retryable; everything else either
    /// reflects caller state (paywall, unknown agent) or infrastructure
    /// faults the retry loop cannot fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            TallyError::Provider { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Upstream.is_retryable());
        assert!(ProviderErrorKind::Parse.is_retryable());
        assert!(!ProviderErrorKind::Auth.is_retryable());
        assert!(!ProviderErrorKind::Validation.is_retryable());
    }

    #[test]
    fn provider_error_display_includes_kind() {
        let err = TallyError::provider(ProviderErrorKind::Upstream, "503 from upstream");
        let msg = err.to_string();
        assert!(msg.contains("Upstream"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
    }

    #[test]
    fn insufficient_balance_carries_amounts() {
        let err = TallyError::InsufficientBalance {
            required: 3,
            available: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('1'), "got: {msg}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_retryable_provider_errors_retry() {
        assert!(TallyError::provider(ProviderErrorKind::RateLimit, "429").is_retryable());
        assert!(!TallyError::provider(ProviderErrorKind::Auth, "401").is_retryable());
        assert!(!TallyError::Internal("oops".into()).is_retryable());
    }
}
