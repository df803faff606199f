//! Process configuration from environment variables.

use std::net::SocketAddr;

use thiserror::Error;

use brewledger_ledger::DebitPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BIND_ADDR '{0}' is not a socket address")]
    InvalidBindAddr(String),

    #[error("DATABASE_URL must start with postgres:// or postgresql://")]
    InvalidDatabaseUrl,

    #[error("LEDGER_DEBIT_POLICY: {0}")]
    InvalidDebitPolicy(String),
}

/// Where ledger state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { url: String },
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::InMemory => "in-memory",
            StoreBackend::Postgres { .. } => "postgres",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub store: StoreBackend,
    pub debit_policy: DebitPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr.clone()))?;

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let store = match var("DATABASE_URL") {
            Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                StoreBackend::Postgres { url }
            }
            Some(_) => return Err(ConfigError::InvalidDatabaseUrl),
            None => {
                tracing::warn!("DATABASE_URL not set; ledger state is kept in memory only");
                StoreBackend::InMemory
            }
        };

        let debit_policy: DebitPolicy = match var("LEDGER_DEBIT_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|e: brewledger_core::DomainError| ConfigError::InvalidDebitPolicy(e.to_string()))?,
            None => DebitPolicy::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            store,
            debit_policy,
        })
    }
}
