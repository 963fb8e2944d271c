// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-based availability tracking for upstream providers.
//!
//! When a provider fails fatally (auth, quota) it is marked unavailable
//! with a reason. `is_available` flips back to true once the cooldown
//! elapses, regardless of whether the root cause was fixed -- callers
//! must tolerate a subsequent failure and re-mark. This is a time-based
//! circuit breaker, not a health-checked one.

use std::time::Duration;

use dashmap::DashMap;
use tally_core::ProviderId;
use tokio::time::Instant;
use tracing::{info, warn};

struct Outage {
    reason: String,
    since: Instant,
}

/// Per-provider availability flags with automatic cooldown healing.
///
/// Process-local, single-writer-per-process state; staleness under
/// multi-instance deployment is an accepted limitation.
pub struct AvailabilityTracker {
    cooldown: Duration,
    outages: DashMap<ProviderId, Outage>,
}

impl AvailabilityTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            outages: DashMap::new(),
        }
    }

    /// Whether the provider is currently usable.
    ///
    /// An outage older than the cooldown is cleared as a side effect.
    pub fn is_available(&self, provider: ProviderId) -> bool {
        let healed = match self.outages.get(&provider) {
            None => return true,
            Some(outage) => outage.since.elapsed() >= self.cooldown,
        };
        if healed {
            self.outages.remove(&provider);
            info!(provider = %provider, "availability cooldown elapsed, provider restored");
        }
        healed
    }

    /// Record a fatal failure for the provider.
    pub fn mark_unavailable(&self, provider: ProviderId, reason: &str) {
        warn!(provider = %provider, reason, "marking provider unavailable");
        self.outages.insert(
            provider,
            Outage {
                reason: reason.to_string(),
                since: Instant::now(),
            },
        );
    }

    /// Explicitly clear an outage before the cooldown elapses.
    pub fn mark_available(&self, provider: ProviderId) {
        if self.outages.remove(&provider).is_some() {
            info!(provider = %provider, "provider explicitly marked available");
        }
    }

    /// Reason recorded for the provider's current outage, if any.
    pub fn last_error(&self, provider: ProviderId) -> Option<String> {
        self.outages.get(&provider).map(|o| o.reason.clone())
    }
}
