// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent orchestration for the Tally credit-metered service.
//!
//! [`AgentOrchestrator`] runs the single-agent turn state machine
//! (check credits, deduct, invoke, respond); [`MultiQueryProcessor`] is
//! the sibling entry point that skips personality and fans the same
//! query out across providers.

pub mod catalog;
pub mod fanout;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testsupport;

pub use catalog::AgentCatalog;
pub use fanout::{MultiQueryProcessor, QueryOutcome};
pub use orchestrator::{AgentOrchestrator, TurnOutcome, TurnRequest, TurnState};
