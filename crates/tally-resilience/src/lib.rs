// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the Tally agent service: per-provider
//! sliding-window rate limiting and time-based availability cooldowns.
//!
//! Both trackers are explicit injected state objects constructed once at
//! process start and shared by `Arc` -- never module-level globals.

pub mod availability;
pub mod rate_limit;

pub use availability::AvailabilityTracker;
pub use rate_limit::{RateLimitTracker, RateLimits};
