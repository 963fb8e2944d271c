// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config-backed implementation of the identity seam.
//!
//! Production deployments hold one API key per provider in config or
//! environment; `refresh` re-reads the same key since a static credential
//! has no session to renew. A session-token identity service can replace
//! this by implementing [`IdentityProvider`].

use std::collections::HashMap;

use async_trait::async_trait;
use tally_config::model::ProvidersConfig;
use tally_core::{IdentityProvider, ProviderId, TallyError};
use tracing::debug;

/// Static per-provider API keys sourced from configuration.
pub struct StaticCredentials {
    keys: HashMap<ProviderId, String>,
}

impl StaticCredentials {
    pub fn from_config(providers: &ProvidersConfig) -> Self {
        let keys = ProviderId::ALL
            .into_iter()
            .filter_map(|p| {
                providers
                    .get(p)
                    .api_key
                    .as_ref()
                    .filter(|k| !k.is_empty())
                    .map(|k| (p, k.clone()))
            })
            .collect();
        Self { keys }
    }
}

#[async_trait]
impl IdentityProvider for StaticCredentials {
    async fn credential(
        &self,
        provider: ProviderId,
        _user_id: &str,
    ) -> Result<Option<String>, TallyError> {
        Ok(self.keys.get(&provider).cloned())
    }

    async fn refresh(
        &self,
        provider: ProviderId,
        _user_id: &str,
    ) -> Result<Option<String>, TallyError> {
        debug!(provider = %provider, "static credentials have no session to refresh");
        Ok(self.keys.get(&provider).cloned())
    }
}
