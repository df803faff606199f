//! Operation pipeline: load → decide → persist.
//!
//! ```text
//! request
//!   ↓
//! 1. Load the batches the operation references from the store
//!   ↓
//! 2. Build a Ledger over them and run the pure domain step
//!   ↓
//! 3. Persist the resulting ChangeSet atomically (version-checked)
//! ```
//!
//! Domain rejections never reach the store. A concurrent writer invalidating
//! step 2 surfaces as [`ServiceError::Conflict`]; the caller may retry.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use brewledger_core::{BatchId, DomainError, SessionId};
use brewledger_ledger::{Batch, DebitPolicy, Ledger, RegisterBatch};
use brewledger_sessions::{
    ConsumptionSummary, RecordSession, Session, SessionEdit, SessionFilter, record_session,
};

use crate::store::{ChangeSet, LedgerStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Conflict(msg),
            StoreError::DuplicateBatch(id) => ServiceError::Domain(DomainError::DuplicateBatchId(id)),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Sessions, batches and the ledger total in one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    /// Newest registration first.
    pub sessions: Vec<Session>,
    /// Ordered by id.
    pub batches: Vec<Batch>,
    pub total_remaining: f64,
}

/// Result of a filtered session listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionQuery {
    pub sessions: Vec<Session>,
    pub summary: ConsumptionSummary,
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    policy: DebitPolicy,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: DebitPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> DebitPolicy {
        self.policy
    }

    /// Working ledger holding whichever of `ids` currently exist.
    async fn load_ledger(&self, ids: &[BatchId]) -> Result<Ledger, ServiceError> {
        let mut batches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(batch) = self.store.get_batch(id).await? {
                batches.push(batch);
            }
        }
        Ok(Ledger::with_batches(self.policy, batches))
    }

    #[instrument(skip(self, cmd), fields(batch_id = %cmd.batch_id))]
    pub async fn register_batch(&self, cmd: RegisterBatch) -> Result<Batch, ServiceError> {
        let mut ledger = self.load_ledger(std::slice::from_ref(&cmd.batch_id)).await?;

        let events = ledger.register_batch(&cmd).inspect_err(|e| {
            tracing::warn!(error = %e, "batch registration rejected");
        })?;
        self.store.apply(ChangeSet::ledger(events)).await?;

        let batch = ledger.lookup(&cmd.batch_id)?.clone();
        tracing::info!(
            initial_volume = batch.initial_volume(),
            prepared_on = %batch.prepared_on(),
            "batch registered"
        );
        Ok(batch)
    }

    pub async fn lookup_batch(&self, id: &BatchId) -> Result<Batch, ServiceError> {
        self.store
            .get_batch(id)
            .await?
            .ok_or_else(|| DomainError::BatchNotFound(id.to_string()).into())
    }

    pub async fn list_batches(&self) -> Result<Vec<Batch>, ServiceError> {
        Ok(self.store.list_batches().await?)
    }

    /// Remove a batch. Sessions that drew from it keep their usage text.
    #[instrument(skip(self), fields(batch_id = %id))]
    pub async fn remove_batch(&self, id: &BatchId) -> Result<Batch, ServiceError> {
        let mut ledger = self.load_ledger(std::slice::from_ref(id)).await?;
        let removed = ledger.lookup(id)?.clone();

        let events = ledger.remove_batch(id)?;
        self.store.apply(ChangeSet::ledger(events)).await?;

        tracing::info!(remaining_volume = removed.remaining_volume(), "batch removed");
        Ok(removed)
    }

    pub async fn overview(&self) -> Result<Overview, ServiceError> {
        let batches = self.store.list_batches().await?;
        let sessions = self.store.list_sessions().await?;
        let total_remaining = Ledger::with_batches(self.policy, batches.iter().cloned()).total_remaining();

        Ok(Overview {
            sessions,
            batches,
            total_remaining,
        })
    }

    /// Record a session, debiting every batch in its usage in one atomic step.
    #[instrument(skip(self, cmd), fields(session = %cmd.name, usage = %cmd.usage))]
    pub async fn record_session(&self, cmd: RecordSession) -> Result<Session, ServiceError> {
        let ids = cmd.referenced_batches()?;
        let mut ledger = self.load_ledger(&ids).await?;

        let recording = record_session(&mut ledger, &cmd).inspect_err(|e| {
            tracing::warn!(error = %e, "session recording rejected");
        })?;

        let debited = recording.ledger_events.len();
        let session = self
            .store
            .apply(ChangeSet {
                ledger_events: recording.ledger_events,
                new_session: Some(recording.session),
            })
            .await?
            .ok_or_else(|| {
                ServiceError::Store(StoreError::Database("store did not return the recorded session".into()))
            })?;

        tracing::info!(
            session_id = %session.id,
            starting_volume = session.record.starting_volume,
            consumed_volume = session.record.consumed_volume,
            ledger_events = debited,
            "session recorded"
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: SessionId) -> Result<Session, ServiceError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| DomainError::SessionNotFound(id.get()).into())
    }

    /// Edit a session in place. The ledger is not touched.
    #[instrument(skip(self, edit), fields(session_id = %id))]
    pub async fn update_session(&self, id: SessionId, edit: &SessionEdit) -> Result<Session, ServiceError> {
        let mut session = self.get_session(id).await?;
        session.apply_edit(edit).inspect_err(|e| {
            tracing::warn!(error = %e, "session edit rejected");
        })?;

        if !self.store.update_session(&session).await? {
            return Err(DomainError::SessionNotFound(id.get()).into());
        }
        tracing::info!("session updated");
        Ok(session)
    }

    /// Delete a session. Volume it debited is not given back to any batch.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn delete_session(&self, id: SessionId) -> Result<(), ServiceError> {
        if !self.store.delete_session(id).await? {
            return Err(DomainError::SessionNotFound(id.get()).into());
        }
        tracing::info!("session deleted");
        Ok(())
    }

    pub async fn query_sessions(&self, filter: &SessionFilter) -> Result<SessionQuery, ServiceError> {
        let sessions = filter.apply(self.store.list_sessions().await?);
        let summary = ConsumptionSummary::from_sessions(&sessions);
        Ok(SessionQuery { sessions, summary })
    }
}
