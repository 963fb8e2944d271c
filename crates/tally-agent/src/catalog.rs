// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent personality catalog.
//!
//! Profiles come from `[[agents]]` config tables; an empty list falls
//! back to the built-in default personalities so a bare install still
//! has something to talk to.

use std::collections::HashMap;

use tally_config::model::{AgentProfileConfig, default_agents};

/// Lookup table of agent personalities, keyed by id.
pub struct AgentCatalog {
    agents: HashMap<String, AgentProfileConfig>,
    order: Vec<String>,
}

impl AgentCatalog {
    pub fn from_config(agents: &[AgentProfileConfig]) -> Self {
        let profiles = if agents.is_empty() {
            default_agents()
        } else {
            agents.to_vec()
        };
        let order = profiles.iter().map(|a| a.id.clone()).collect();
        let agents = profiles.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self { agents, order }
    }

    pub fn get(&self, id: &str) -> Option<&AgentProfileConfig> {
        self.agents.get(id)
    }

    /// Agent ids in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::ProviderId;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let catalog = AgentCatalog::from_config(&[]);
        assert!(!catalog.is_empty());
        assert!(catalog.get("scholar").is_some());
    }

    #[test]
    fn configured_agents_replace_defaults() {
        let custom = vec![AgentProfileConfig {
            id: "echo".to_string(),
            name: "Echo".to_string(),
            system_prompt: "repeat".to_string(),
            provider: ProviderId::OpenAi,
            model: None,
            credits_cost: 1,
            temperature: 0.5,
            max_tokens: 256,
        }];
        let catalog = AgentCatalog::from_config(&custom);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("echo").is_some());
        assert!(catalog.get("scholar").is_none());
    }

    #[test]
    fn ids_preserve_declaration_order() {
        let catalog = AgentCatalog::from_config(&[]);
        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["scholar", "spark", "pragma"]);
    }
}
