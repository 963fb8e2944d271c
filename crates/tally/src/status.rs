// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally status`: print the effective configuration summary and verify
//! the database opens.

use tally_agent::AgentCatalog;
use tally_config::TallyConfig;
use tally_core::{ProviderId, TallyError};
use tally_storage::Database;

pub async fn run(config: TallyConfig) -> Result<(), TallyError> {
    println!("service: {}", config.service.name);
    println!(
        "gateway: {}:{} (auth {})",
        config.gateway.host,
        config.gateway.port,
        if config.gateway.bearer_token.is_some() {
            "configured"
        } else {
            "MISSING - all API requests will be rejected"
        }
    );

    let catalog = AgentCatalog::from_config(&config.agents);
    println!("agents ({}):", catalog.len());
    for id in catalog.ids() {
        if let Some(agent) = catalog.get(id) {
            println!(
                "  {id}: {} via {} ({} credits/turn)",
                agent.name, agent.provider, agent.credits_cost
            );
        }
    }

    println!("providers:");
    for provider in ProviderId::ALL {
        let pc = config.providers.get(provider);
        println!(
            "  {provider}: {} (key {}, max_tokens {}, {} req/min)",
            if pc.enabled { "enabled" } else { "disabled" },
            if pc.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                "set"
            } else {
                "unset"
            },
            pc.max_tokens_ceiling,
            pc.requests_per_minute,
        );
    }

    let db = Database::open(&config.storage.database_path).await?;
    db.close().await?;
    println!("storage: ok ({})", config.storage.database_path);

    Ok(())
}
