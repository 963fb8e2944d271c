// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Tally agent service.
//!
//! Exposes the two upward-facing operations -- single-agent turns and
//! multi-provider queries -- plus credit balance reads and the billing
//! event sink, behind bearer auth with a public health route.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{AppState, ServerConfig, router, start_server};
