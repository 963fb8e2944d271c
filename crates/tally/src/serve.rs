// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component wiring for `tally serve`.
//!
//! Builds each layer bottom-up -- storage, ledger, resilience trackers,
//! provider gateway, orchestrator -- and hands the lot to the HTTP
//! server. Every piece of shared state is constructed exactly once here
//! and passed down by `Arc`.

use std::sync::Arc;
use std::time::Duration;

use tally_agent::{AgentCatalog, AgentOrchestrator, MultiQueryProcessor};
use tally_config::TallyConfig;
use tally_core::{IdentityProvider, ProviderBackend, TallyError};
use tally_gateway::{AppState, AuthConfig, ServerConfig, start_server};
use tally_ledger::CreditLedger;
use tally_notify::Notifier;
use tally_provider::{ProviderClient, ProviderGateway, StaticCredentials};
use tally_resilience::{AvailabilityTracker, RateLimitTracker};
use tally_storage::Database;
use tracing::info;

pub async fn run(config: TallyConfig) -> Result<(), TallyError> {
    let db = Database::open(&config.storage.database_path).await?;
    let ledger = Arc::new(CreditLedger::new(&db));

    let limits = Arc::new(RateLimitTracker::from_config(&config.providers));
    let availability = Arc::new(AvailabilityTracker::new(Duration::from_secs(
        config.resilience.availability_cooldown_secs,
    )));
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(StaticCredentials::from_config(&config.providers));

    let client = ProviderClient::new(
        config.providers.clone(),
        config.retry.clone(),
        limits,
        Arc::clone(&availability),
        identity,
    )?;
    let backend: Arc<dyn ProviderBackend> =
        Arc::new(ProviderGateway::new(client, availability));

    let catalog = AgentCatalog::from_config(&config.agents);
    info!(
        agents = catalog.len(),
        database = %config.storage.database_path,
        "tally components initialized"
    );

    let notifier = Notifier::from_config(&config.notify).map(Arc::new);
    let orchestrator = Arc::new(AgentOrchestrator::new(
        catalog,
        Arc::clone(&ledger),
        Arc::clone(&backend),
        db,
        notifier,
    ));
    let processor = Arc::new(MultiQueryProcessor::new(backend));

    let state = AppState {
        orchestrator,
        processor,
        ledger,
        auth: AuthConfig {
            bearer_token: config.gateway.bearer_token.clone(),
        },
        trial_credits: config.billing.trial_credits,
        start_time: std::time::Instant::now(),
    };
    let server_config = ServerConfig {
        host: config.gateway.host.clone(),
        port: config.gateway.port,
    };

    start_server(&server_config, state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// The full wiring path up to (but not including) the listener.
    #[tokio::test]
    async fn components_wire_from_default_config() {
        let dir = tempdir().unwrap();
        let mut config = tally_config::load_and_validate_str("").unwrap();
        config.storage.database_path = dir
            .path()
            .join("tally.db")
            .to_string_lossy()
            .into_owned();

        let db = Database::open(&config.storage.database_path).await.unwrap();
        let ledger = Arc::new(CreditLedger::new(&db));
        let limits = Arc::new(RateLimitTracker::from_config(&config.providers));
        let availability = Arc::new(AvailabilityTracker::new(Duration::from_secs(300)));
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(StaticCredentials::from_config(&config.providers));
        let client = ProviderClient::new(
            config.providers.clone(),
            config.retry.clone(),
            limits,
            Arc::clone(&availability),
            identity,
        )
        .unwrap();
        let backend: Arc<dyn ProviderBackend> =
            Arc::new(ProviderGateway::new(client, availability));
        let catalog = AgentCatalog::from_config(&config.agents);
        assert_eq!(catalog.len(), 3);

        let orchestrator = AgentOrchestrator::new(
            catalog,
            Arc::clone(&ledger),
            Arc::clone(&backend),
            db,
            None,
        );
        assert!(orchestrator.catalog().get("scholar").is_some());
    }
}
