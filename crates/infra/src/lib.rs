//! Infrastructure layer: configuration, persistence and the operation pipeline.

pub mod config;
pub mod service;
pub mod store;


pub use config::{AppConfig, ConfigError, StoreBackend};
pub use service::{LedgerService, Overview, ServiceError, SessionQuery};
pub use store::{ChangeSet, InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
