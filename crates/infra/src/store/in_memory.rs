use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use brewledger_core::{AggregateRoot, BatchId, SessionId};
use brewledger_ledger::{Batch, DebitPolicy, Ledger};
use brewledger_sessions::{Session, sort_newest_first};

use super::{ChangeSet, LedgerStore, StoreError, check_versions};

#[derive(Debug, Default)]
struct State {
    batches: Ledger,
    sessions: BTreeMap<SessionId, Session>,
    last_session_id: u64,
}

/// In-memory ledger store.
///
/// Intended for tests and local runs; everything is lost on restart. One mutex
/// serializes all writers.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    state: Mutex<State>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                // Stores hold state only; the debit policy is applied by the service.
                batches: Ledger::new(DebitPolicy::AllowOverdraw),
                ..State::default()
            }),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.batches.batches().cloned().collect())
    }

    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.batches.lookup(id).ok().cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<Option<Session>, StoreError> {
        let mut state = self.state.lock().await;

        let mut versions: BTreeMap<BatchId, u64> = changes
            .ledger_events
            .iter()
            .filter_map(|e| state.batches.lookup(e.batch_id()).ok())
            .map(|b| (b.id_typed().clone(), b.version()))
            .collect();
        check_versions(&mut versions, &changes.ledger_events)?;

        // Checked; from here on nothing can fail.
        for event in &changes.ledger_events {
            state.batches.apply(event);
        }

        let session = changes.new_session.map(|record| {
            state.last_session_id += 1;
            let session = record.with_id(SessionId::new(state.last_session_id));
            state.sessions.insert(session.id, session.clone());
            session
        });
        Ok(session)
    }

    async fn update_session(&self, session: &Session) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&session.id) {
            Some(stored) => {
                *stored = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.sessions.remove(&id).is_some())
    }
}
