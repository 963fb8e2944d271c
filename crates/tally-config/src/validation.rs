// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as positive retry counts and in-range confidence
//! baselines.

use std::collections::HashSet;

use miette::Diagnostic;
use tally_core::ProviderId;
use thiserror::Error;

use crate::model::TallyConfig;

/// A configuration error suitable for miette rendering.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ConfigError {
    /// The TOML/env input could not be parsed or merged.
    #[error("{message}")]
    #[diagnostic(code(tally::config::parse))]
    Parse { message: String },

    /// The parsed configuration violates a semantic constraint.
    #[error("{message}")]
    #[diagnostic(code(tally::config::validation))]
    Validation { message: String },
}

/// Render collected configuration errors to stderr.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        eprintln!("{:?}", miette::Report::new(error.clone()));
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)`
/// with all collected validation errors (does not fail fast).
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.gateway.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if config.resilience.availability_cooldown_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "resilience.availability_cooldown_secs must be positive".to_string(),
        });
    }

    if config.billing.trial_credits < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "billing.trial_credits must be non-negative, got {}",
                config.billing.trial_credits
            ),
        });
    }

    for provider in ProviderId::ALL {
        let pc = config.providers.get(provider);
        if pc.max_tokens_ceiling == 0 {
            errors.push(ConfigError::Validation {
                message: format!("providers.{provider}.max_tokens_ceiling must be positive"),
            });
        }
        if pc.requests_per_minute == 0 {
            errors.push(ConfigError::Validation {
                message: format!("providers.{provider}.requests_per_minute must be positive"),
            });
        }
        if !(0.0..=1.0).contains(&pc.confidence_baseline) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "providers.{provider}.confidence_baseline must be within [0.0, 1.0], got {}",
                    pc.confidence_baseline
                ),
            });
        }
        if pc.base_url.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("providers.{provider}.base_url must not be empty"),
            });
        }
    }

    // Validate no duplicate agent ids
    let mut seen_ids = HashSet::new();
    for agent in &config.agents {
        if !seen_ids.insert(&agent.id) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate agent id `{}` in [[agents]] array", agent.id),
            });
        }
    }

    for (i, agent) in config.agents.iter().enumerate() {
        if agent.id.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("agents[{i}].id must not be empty"),
            });
        }
        if agent.credits_cost < 0 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "agents[{i}].credits_cost must be non-negative, got {}",
                    agent.credits_cost
                ),
            });
        }
        if !(0.0..=2.0).contains(&agent.temperature) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "agents[{i}].temperature must be within [0.0, 2.0], got {}",
                    agent.temperature
                ),
            });
        }
        if agent.max_tokens == 0 {
            errors.push(ConfigError::Validation {
                message: format!("agents[{i}].max_tokens must be positive"),
            });
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
