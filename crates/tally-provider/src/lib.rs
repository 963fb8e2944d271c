// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upstream LLM provider gateway for the Tally agent service.
//!
//! Normalizes three vendor APIs behind one client, classifies failures
//! into a typed taxonomy at the HTTP boundary, retries transient errors
//! with exponential backoff, and applies ordered-candidate fallback
//! across providers via [`ProviderGateway`].

pub mod client;
pub mod confidence;
pub mod gateway;
pub mod identity;
pub mod payload;
pub mod redact;
pub mod sanitize;

pub use client::ProviderClient;
pub use gateway::ProviderGateway;
pub use identity::StaticCredentials;
