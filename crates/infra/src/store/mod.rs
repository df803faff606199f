//! Persistence boundary for batches and sessions.
//!
//! Stores never run domain logic. The service decides a [`ChangeSet`] against
//! a [`Ledger`](brewledger_ledger::Ledger) built from the batches it loaded,
//! and the store persists it all-or-nothing.
//!
//! ## Optimistic concurrency
//!
//! Every debit and removal carries the batch version it was decided against.
//! `apply` re-checks those versions inside its own atomic section; if another
//! writer got there first the whole change set is rejected with
//! [`StoreError::Concurrency`] and nothing is written.

pub mod in_memory;
pub mod postgres;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use brewledger_core::{AggregateRoot, BatchId, SessionId};
use brewledger_ledger::{Batch, LedgerEvent};
use brewledger_sessions::{Session, SessionRecord};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("batch '{0}' already exists")]
    DuplicateBatch(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Everything one operation writes, persisted atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub ledger_events: Vec<LedgerEvent>,
    /// A freshly recorded session; the store assigns its id.
    pub new_session: Option<SessionRecord>,
}

impl ChangeSet {
    pub fn ledger(events: Vec<LedgerEvent>) -> Self {
        Self {
            ledger_events: events,
            new_session: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ledger_events.is_empty() && self.new_session.is_none()
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All batches, ordered by id.
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError>;

    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError>;

    /// All sessions, newest registration first.
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// Persist a change set atomically. Returns the new session, if one was recorded.
    async fn apply(&self, changes: ChangeSet) -> Result<Option<Session>, StoreError>;

    /// Overwrite a stored session. `false` when the id is unknown.
    async fn update_session(&self, session: &Session) -> Result<bool, StoreError>;

    /// `false` when the id is unknown.
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        (**self).list_batches().await
    }

    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError> {
        (**self).get_batch(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        (**self).list_sessions().await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        (**self).get_session(id).await
    }

    async fn apply(&self, changes: ChangeSet) -> Result<Option<Session>, StoreError> {
        (**self).apply(changes).await
    }

    async fn update_session(&self, session: &Session) -> Result<bool, StoreError> {
        (**self).update_session(session).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        (**self).delete_session(id).await
    }
}

/// Replay `events` over `versions` (batch id → current version), checking
/// each expectation. Shared by both backends so they agree on what a stale
/// change set is.
pub(crate) fn check_versions(
    versions: &mut BTreeMap<BatchId, u64>,
    events: &[LedgerEvent],
) -> Result<(), StoreError> {
    for event in events {
        match event {
            LedgerEvent::BatchRegistered(batch) => {
                if versions.contains_key(batch.id_typed()) {
                    return Err(StoreError::DuplicateBatch(batch.id_typed().to_string()));
                }
                versions.insert(batch.id_typed().clone(), batch.version());
            }
            LedgerEvent::BatchDebited(e) => {
                let current = expect_version(versions, &e.batch_id, e.expected_version)?;
                *current += 1;
            }
            LedgerEvent::BatchRemoved(e) => {
                expect_version(versions, &e.batch_id, e.expected_version)?;
                versions.remove(&e.batch_id);
            }
        }
    }
    Ok(())
}

fn expect_version<'a>(
    versions: &'a mut BTreeMap<BatchId, u64>,
    id: &BatchId,
    expected: u64,
) -> Result<&'a mut u64, StoreError> {
    match versions.get_mut(id) {
        Some(current) if *current == expected => Ok(current),
        Some(current) => Err(StoreError::Concurrency(format!(
            "batch '{id}' is at version {current}, change was decided at {expected}"
        ))),
        None => Err(StoreError::Concurrency(format!(
            "batch '{id}' was removed concurrently"
        ))),
    }
}
