// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-provider sliding-window rate limiting.
//!
//! Each provider gets a 60-second trailing window of request timestamps
//! and `(timestamp, token_count)` usage entries. Entries are pruned on
//! every check, so the window is self-cleaning. State is process-local:
//! multiple server instances each keep an independent window, and the
//! resulting drift is a documented limitation rather than a bug.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tally_config::model::ProvidersConfig;
use tally_core::ProviderId;
use tokio::time::Instant;
use tracing::debug;

/// The trailing window all limits are measured over.
const WINDOW: Duration = Duration::from_secs(60);

/// Per-provider request and token ceilings within the window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
}

#[derive(Default)]
struct Window {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u32)>,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while self
            .requests
            .front()
            .is_some_and(|t| now.duration_since(*t) > WINDOW)
        {
            self.requests.pop_front();
        }
        while self
            .tokens
            .front()
            .is_some_and(|(t, _)| now.duration_since(*t) > WINDOW)
        {
            self.tokens.pop_front();
        }
    }
}

/// Sliding-window request/token tracker, one window per provider.
///
/// Constructed once at process start and shared by `Arc`; there is no
/// module-level global.
pub struct RateLimitTracker {
    limits: HashMap<ProviderId, RateLimits>,
    windows: Mutex<HashMap<ProviderId, Window>>,
}

impl RateLimitTracker {
    pub fn new(limits: HashMap<ProviderId, RateLimits>) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Build a tracker from the per-provider config tables.
    pub fn from_config(providers: &ProvidersConfig) -> Self {
        let limits = ProviderId::ALL
            .into_iter()
            .map(|p| {
                let pc = providers.get(p);
                (
                    p,
                    RateLimits {
                        requests_per_minute: pc.requests_per_minute,
                        tokens_per_minute: pc.tokens_per_minute,
                    },
                )
            })
            .collect();
        Self::new(limits)
    }

    /// Whether another request to `provider` fits in the current window.
    ///
    /// Prunes aged-out entries first, then compares the remaining request
    /// count against the provider's per-minute limit. Providers without
    /// configured limits are never throttled.
    pub fn check(&self, provider: ProviderId) -> bool {
        let Some(limits) = self.limits.get(&provider) else {
            return true;
        };
        let mut windows = self.lock_windows();
        let window = windows.entry(provider).or_default();
        window.prune(Instant::now());
        let allowed = window.requests.len() < limits.requests_per_minute as usize;
        if !allowed {
            debug!(
                provider = %provider,
                in_window = window.requests.len(),
                limit = limits.requests_per_minute,
                "request window exhausted"
            );
        }
        allowed
    }

    /// Record one completed request and its token usage.
    ///
    /// Tokens are stored as a `(timestamp, count)` pair; only the
    /// aggregate count within the window is observable.
    pub fn record(&self, provider: ProviderId, token_count: u32) {
        let now = Instant::now();
        let mut windows = self.lock_windows();
        let window = windows.entry(provider).or_default();
        window.requests.push_back(now);
        window.tokens.push_back((now, token_count));
    }

    /// Requests recorded within the trailing window.
    pub fn requests_in_window(&self, provider: ProviderId) -> usize {
        let mut windows = self.lock_windows();
        let window = windows.entry(provider).or_default();
        window.prune(Instant::now());
        window.requests.len()
    }

    /// Total token usage recorded within the trailing window.
    pub fn tokens_in_window(&self, provider: ProviderId) -> u64 {
        let mut windows = self.lock_windows();
        let window = windows.entry(provider).or_default();
        window.prune(Instant::now());
        window.tokens.iter().map(|(_, n)| u64::from(*n)).sum()
    }

    fn lock_windows(&self) -> std::sync::MutexGuard<'_, HashMap<ProviderId, Window>> {
        // A poisoned lock only means another thread panicked mid-update;
        // the window data stays structurally valid.
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
