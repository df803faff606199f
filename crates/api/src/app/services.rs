use std::sync::Arc;

use brewledger_infra::{
    AppConfig, InMemoryLedgerStore, LedgerService, LedgerStore, PostgresLedgerStore, StoreBackend,
};

/// Connect (and migrate) the configured store and wrap it in the service.
pub async fn build_service(config: &AppConfig) -> anyhow::Result<LedgerService> {
    let store: Arc<dyn LedgerStore> = match &config.store {
        StoreBackend::InMemory => Arc::new(InMemoryLedgerStore::new()),
        StoreBackend::Postgres { url } => {
            let store = PostgresLedgerStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
    };

    tracing::info!(
        store = config.store.name(),
        debit_policy = ?config.debit_policy,
        "ledger store ready"
    );
    Ok(LedgerService::new(store, config.debit_policy))
}
