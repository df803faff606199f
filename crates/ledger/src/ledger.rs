use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use brewledger_core::{AggregateRoot, BatchId, DomainError, DomainResult};

use crate::batch::{Batch, DebitPolicy, RegisterBatch};

/// Event: BatchDebited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDebited {
    pub batch_id: BatchId,
    pub amount: f64,
    /// Version the batch had before this debit (for conditional updates).
    pub expected_version: u64,
    pub remaining_after: f64,
}

/// Event: BatchRemoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRemoved {
    pub batch_id: BatchId,
    pub expected_version: u64,
}

/// Changes to the ledger, in the order they were decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LedgerEvent {
    BatchRegistered(Batch),
    BatchDebited(BatchDebited),
    BatchRemoved(BatchRemoved),
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::BatchRegistered(_) => "ledger.batch.registered",
            LedgerEvent::BatchDebited(_) => "ledger.batch.debited",
            LedgerEvent::BatchRemoved(_) => "ledger.batch.removed",
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        match self {
            LedgerEvent::BatchRegistered(b) => b.id_typed(),
            LedgerEvent::BatchDebited(e) => &e.batch_id,
            LedgerEvent::BatchRemoved(e) => &e.batch_id,
        }
    }
}

/// Working set of batches, keyed (and iterated) by batch id.
///
/// A `Ledger` holds whatever batches the caller loaded: the whole inventory for
/// reporting, or only the batches a session references when recording. All
/// mutation goes through a [`LedgerTransaction`], which stages changes until
/// `commit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    batches: BTreeMap<BatchId, Batch>,
    policy: DebitPolicy,
}

impl Ledger {
    pub fn new(policy: DebitPolicy) -> Self {
        Self {
            batches: BTreeMap::new(),
            policy,
        }
    }

    pub fn with_batches(policy: DebitPolicy, batches: impl IntoIterator<Item = Batch>) -> Self {
        let batches = batches
            .into_iter()
            .map(|b| (b.id_typed().clone(), b))
            .collect();
        Self { batches, policy }
    }

    pub fn lookup(&self, id: &BatchId) -> DomainResult<&Batch> {
        self.batches
            .get(id)
            .ok_or_else(|| DomainError::BatchNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &BatchId) -> bool {
        self.batches.contains_key(id)
    }

    /// Batches ordered by id.
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.values()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Sum of remaining volume across all batches (reporting only).
    pub fn total_remaining(&self) -> f64 {
        self.batches.values().map(Batch::remaining_volume).sum()
    }

    pub fn register_batch(&mut self, cmd: &RegisterBatch) -> DomainResult<Vec<LedgerEvent>> {
        let mut tx = self.transaction();
        tx.register_batch(cmd)?;
        Ok(tx.commit())
    }

    pub fn debit(&mut self, id: &BatchId, amount: f64) -> DomainResult<Vec<LedgerEvent>> {
        let mut tx = self.transaction();
        tx.debit(id, amount)?;
        Ok(tx.commit())
    }

    /// Remove a batch. Historical sessions that drew from it are left untouched.
    pub fn remove_batch(&mut self, id: &BatchId) -> DomainResult<Vec<LedgerEvent>> {
        let mut tx = self.transaction();
        tx.remove_batch(id)?;
        Ok(tx.commit())
    }

    /// Start a staged unit of work over this ledger.
    pub fn transaction(&mut self) -> LedgerTransaction<'_> {
        LedgerTransaction {
            ledger: self,
            staged: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Evolve state from a single event.
    pub fn apply(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::BatchRegistered(batch) => {
                self.batches.insert(batch.id_typed().clone(), batch.clone());
            }
            LedgerEvent::BatchDebited(e) => {
                if let Some(batch) = self.batches.get_mut(&e.batch_id) {
                    batch.set_balance(e.remaining_after);
                }
            }
            LedgerEvent::BatchRemoved(e) => {
                self.batches.remove(&e.batch_id);
            }
        }
    }
}

/// Staged ledger changes.
///
/// Every operation validates against the ledger as modified by the operations
/// staged before it, so two entries drawing from the same batch see each other.
/// Nothing reaches the underlying [`Ledger`] until [`commit`](Self::commit);
/// dropping the transaction discards everything.
#[derive(Debug)]
pub struct LedgerTransaction<'a> {
    ledger: &'a mut Ledger,
    /// `None` marks a batch removed within this transaction.
    staged: BTreeMap<BatchId, Option<Batch>>,
    events: Vec<LedgerEvent>,
}

impl LedgerTransaction<'_> {
    fn current(&self, id: &BatchId) -> Option<&Batch> {
        match self.staged.get(id) {
            Some(staged) => staged.as_ref(),
            None => self.ledger.batches.get(id),
        }
    }

    fn policy(&self) -> DebitPolicy {
        self.ledger.policy
    }

    pub fn lookup(&self, id: &BatchId) -> DomainResult<&Batch> {
        self.current(id)
            .ok_or_else(|| DomainError::BatchNotFound(id.to_string()))
    }

    pub fn register_batch(&mut self, cmd: &RegisterBatch) -> DomainResult<&Batch> {
        if self.current(&cmd.batch_id).is_some() {
            return Err(DomainError::DuplicateBatchId(cmd.batch_id.to_string()));
        }

        let batch = Batch::register(cmd)?;
        self.events.push(LedgerEvent::BatchRegistered(batch.clone()));
        Ok(self.stage(batch))
    }

    pub fn debit(&mut self, id: &BatchId, amount: f64) -> DomainResult<&Batch> {
        let policy = self.policy();
        let mut batch = self.lookup(id)?.clone();
        let expected_version = batch.version();

        batch.debit(amount, policy)?;

        self.events.push(LedgerEvent::BatchDebited(BatchDebited {
            batch_id: id.clone(),
            amount,
            expected_version,
            remaining_after: batch.remaining_volume(),
        }));
        Ok(self.stage(batch))
    }

    pub fn remove_batch(&mut self, id: &BatchId) -> DomainResult<Batch> {
        let batch = self.lookup(id)?.clone();

        self.events.push(LedgerEvent::BatchRemoved(BatchRemoved {
            batch_id: id.clone(),
            expected_version: batch.version(),
        }));
        self.staged.insert(id.clone(), None);
        Ok(batch)
    }

    /// Apply all staged events to the ledger and return them.
    pub fn commit(self) -> Vec<LedgerEvent> {
        for event in &self.events {
            self.ledger.apply(event);
        }
        self.events
    }

    fn stage(&mut self, batch: Batch) -> &Batch {
        let id = batch.id_typed().clone();
        self.staged.entry(id).or_insert(None).insert(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchOrigin;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn batch_id(raw: &str) -> BatchId {
        BatchId::new(raw).unwrap()
    }

    fn register(id: &str, liters: f64) -> RegisterBatch {
        RegisterBatch {
            batch_id: batch_id(id),
            prepared_on: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            responsible: "Mestre Silva".to_string(),
            initial_volume: liters,
            notes: "first brew".to_string(),
            origin: BatchOrigin::Prepared,
        }
    }

    fn ledger_with(batches: &[(&str, f64)]) -> Ledger {
        let mut ledger = Ledger::new(DebitPolicy::Enforce);
        for (id, liters) in batches {
            ledger.register_batch(&register(id, *liters)).unwrap();
        }
        ledger
    }

    #[test]
    fn register_then_lookup() {
        let ledger = ledger_with(&[("A", 10.0)]);
        let batch = ledger.lookup(&batch_id("A")).unwrap();
        assert_eq!(batch.remaining_volume(), 10.0);
        assert_eq!(batch.notes(), "first brew");
    }

    #[test]
    fn duplicate_registration_leaves_existing_batch_intact() {
        let mut ledger = ledger_with(&[("A", 10.0)]);
        let err = ledger.register_batch(&register("A", 99.0)).unwrap_err();
        assert_eq!(err, DomainError::DuplicateBatchId("A".into()));
        assert_eq!(ledger.lookup(&batch_id("A")).unwrap().initial_volume(), 10.0);
    }

    #[test]
    fn lookup_unknown_batch_fails() {
        let ledger = Ledger::default();
        assert_eq!(
            ledger.lookup(&batch_id("Z")).unwrap_err(),
            DomainError::BatchNotFound("Z".into())
        );
    }

    #[test]
    fn debit_emits_event_with_expected_version() {
        let mut ledger = ledger_with(&[("A", 10.0)]);
        let events = ledger.debit(&batch_id("A"), 4.5).unwrap();
        assert_eq!(
            events,
            vec![LedgerEvent::BatchDebited(BatchDebited {
                batch_id: batch_id("A"),
                amount: 4.5,
                expected_version: 1,
                remaining_after: 5.5,
            })]
        );
        let batch = ledger.lookup(&batch_id("A")).unwrap();
        assert_eq!(batch.remaining_volume(), 5.5);
        assert_eq!(batch.version(), 2);
    }

    #[test]
    fn insufficient_debit_leaves_every_batch_unchanged() {
        let mut ledger = ledger_with(&[("A", 10.0), ("B", 1.0)]);
        let before = ledger.clone();
        let err = ledger.debit(&batch_id("B"), 1.5).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientVolume { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn dropped_transaction_discards_staged_debits() {
        let mut ledger = ledger_with(&[("A", 10.0)]);
        {
            let mut tx = ledger.transaction();
            tx.debit(&batch_id("A"), 4.5).unwrap();
            assert_eq!(tx.lookup(&batch_id("A")).unwrap().remaining_volume(), 5.5);
            assert!(tx.debit(&batch_id("B"), 3.0).is_err());
        }
        assert_eq!(ledger.lookup(&batch_id("A")).unwrap().remaining_volume(), 10.0);
    }

    #[test]
    fn staged_debits_of_the_same_batch_accumulate() {
        let mut ledger = ledger_with(&[("A", 5.0)]);
        let mut tx = ledger.transaction();
        tx.debit(&batch_id("A"), 3.0).unwrap();
        let err = tx.debit(&batch_id("A"), 3.0).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientVolume {
                batch_id: "A".into(),
                requested: 3.0,
                available: 2.0,
            }
        );
    }

    #[test]
    fn commit_applies_events_in_order() {
        let mut ledger = ledger_with(&[("A", 10.0)]);
        let mut tx = ledger.transaction();
        tx.debit(&batch_id("A"), 1.0).unwrap();
        tx.debit(&batch_id("A"), 2.0).unwrap();
        tx.register_batch(&register("R", 0.5)).unwrap();
        let events = tx.commit();

        assert_eq!(events.len(), 3);
        let a = ledger.lookup(&batch_id("A")).unwrap();
        assert_eq!(a.remaining_volume(), 7.0);
        assert_eq!(a.version(), 3);
        assert!(ledger.contains(&batch_id("R")));
    }

    #[test]
    fn remove_is_unconditional_and_reported() {
        let mut ledger = ledger_with(&[("A", 10.0), ("B", 3.0)]);
        ledger.debit(&batch_id("A"), 10.0).unwrap();
        let events = ledger.remove_batch(&batch_id("A")).unwrap();
        assert_eq!(events[0].event_type(), "ledger.batch.removed");
        assert!(!ledger.contains(&batch_id("A")));
        assert_eq!(ledger.total_remaining(), 3.0);

        assert_eq!(
            ledger.remove_batch(&batch_id("A")).unwrap_err(),
            DomainError::BatchNotFound("A".into())
        );
    }

    #[test]
    fn removed_batch_cannot_be_debited_in_the_same_transaction() {
        let mut ledger = ledger_with(&[("A", 10.0)]);
        let mut tx = ledger.transaction();
        tx.remove_batch(&batch_id("A")).unwrap();
        assert!(matches!(
            tx.debit(&batch_id("A"), 1.0),
            Err(DomainError::BatchNotFound(_))
        ));
    }

    #[test]
    fn overdraw_policy_is_honoured_by_transactions() {
        let mut ledger = Ledger::new(DebitPolicy::AllowOverdraw);
        ledger.register_batch(&register("A", 1.0)).unwrap();
        ledger.debit(&batch_id("A"), 1.5).unwrap();
        assert_eq!(ledger.lookup(&batch_id("A")).unwrap().remaining_volume(), -0.5);
        assert_eq!(ledger.total_remaining(), -0.5);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: successful debits reduce the total by exactly what was drawn,
        /// and rejected debits change nothing.
        #[test]
        fn total_remaining_tracks_accepted_debits(
            initial in 0u32..10_000u32,
            draws in prop::collection::vec(0u32..3_000u32, 1..12)
        ) {
            let initial = f64::from(initial) / 100.0;
            let mut ledger = ledger_with(&[("A", initial)]);
            let mut drawn = 0.0;

            for draw in draws {
                let amount = f64::from(draw) / 100.0;
                let before = ledger.clone();
                match ledger.debit(&batch_id("A"), amount) {
                    Ok(_) => drawn += amount,
                    Err(_) => {
                        prop_assert_eq!(&ledger, &before);
                    }
                }
            }

            prop_assert!((ledger.total_remaining() - (initial - drawn)).abs() < 1e-6);
            prop_assert!(ledger.total_remaining() >= 0.0);
        }
    }
}
