//! Session recording: validate a session's usage against the ledger, debit the
//! batches, and derive consumption metrics.
//!
//! Accounting model: the session's starting volume is **derived** as the sum of
//! the quantities drawn from batches. Callers never supply it on this path, so
//! the ledger debits and the session's starting volume can't disagree.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use brewledger_core::{BatchId, DomainError, DomainResult, ensure_text, ensure_volume};
use brewledger_ledger::{BatchOrigin, Ledger, LedgerEvent, RegisterBatch};

use crate::session::{SessionRecord, derive_consumption};
use crate::usage::UsageEncoding;

/// Responsible party recorded on batches created from session leftovers.
pub const RETURN_RESPONSIBLE: &str = "System (return)";

/// Command: RecordSession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSession {
    pub registered_at: DateTime<Utc>,
    pub name: String,
    pub session_date: NaiveDate,
    pub presiding: String,
    pub topic: String,
    pub readings: String,
    pub preparer: String,
    pub attendees: i64,
    /// Raw usage encoding (`id:qty|id:qty`).
    pub usage: String,
    pub ending_volume: f64,
    /// When set and liquid is left over, the leftover becomes a new batch with this id.
    pub return_batch: Option<BatchId>,
}

impl RecordSession {
    /// Every batch id this recording reads or writes (usage first, then the return batch).
    pub fn referenced_batches(&self) -> DomainResult<Vec<BatchId>> {
        let mut ids = UsageEncoding::parse(&self.usage)?.batch_ids();
        if let Some(return_id) = &self.return_batch {
            if !ids.contains(return_id) {
                ids.push(return_id.clone());
            }
        }
        Ok(ids)
    }
}

/// Outcome of a successful recording: the session to persist and the ledger
/// changes to persist with it, atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub session: SessionRecord,
    pub ledger_events: Vec<LedgerEvent>,
}

/// Record a session against `ledger`.
///
/// All validation happens before anything is committed: every debit (and the
/// optional return batch) is staged in one ledger transaction, and the first
/// failure drops it, leaving `ledger` exactly as it was.
pub fn record_session(ledger: &mut Ledger, cmd: &RecordSession) -> DomainResult<Recording> {
    let usage = UsageEncoding::parse(&cmd.usage)?;
    if usage.is_empty() {
        return Err(DomainError::validation("usage must reference at least one batch"));
    }

    if cmd.attendees <= 0 {
        return Err(DomainError::NonPositiveAttendeeCount(cmd.attendees));
    }
    let ending_volume = ensure_volume("ending_volume", cmd.ending_volume)?;
    let name = ensure_text("name", &cmd.name)?;
    let presiding = ensure_text("presiding", &cmd.presiding)?;
    let preparer = ensure_text("preparer", &cmd.preparer)?;

    let starting_volume = usage.total_quantity();
    let (consumed_volume, per_attendee_ml) =
        derive_consumption(starting_volume, ending_volume, cmd.attendees)?;

    let mut tx = ledger.transaction();
    for entry in usage.entries() {
        tx.debit(&entry.batch_id, entry.quantity)?;
    }

    if let Some(return_id) = &cmd.return_batch {
        if ending_volume > 0.0 {
            tx.register_batch(&RegisterBatch {
                batch_id: return_id.clone(),
                prepared_on: cmd.registered_at.date_naive(),
                responsible: RETURN_RESPONSIBLE.to_string(),
                initial_volume: ending_volume,
                notes: format!("Return from session: {name}"),
                origin: BatchOrigin::SessionReturn {
                    session_name: name.clone(),
                },
            })?;
        }
    }

    let ledger_events = tx.commit();

    Ok(Recording {
        session: SessionRecord {
            registered_at: cmd.registered_at,
            name,
            session_date: cmd.session_date,
            presiding,
            topic: cmd.topic.trim().to_string(),
            readings: cmd.readings.trim().to_string(),
            preparer,
            attendees: cmd.attendees,
            usage,
            starting_volume,
            ending_volume,
            consumed_volume,
            per_attendee_ml,
        },
        ledger_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewledger_ledger::{Batch, DebitPolicy};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn batch_id(raw: &str) -> BatchId {
        BatchId::new(raw).unwrap()
    }

    fn ledger_with(policy: DebitPolicy, batches: &[(&str, f64)]) -> Ledger {
        let mut ledger = Ledger::new(policy);
        for (id, liters) in batches {
            ledger
                .register_batch(&RegisterBatch {
                    batch_id: batch_id(id),
                    prepared_on: NaiveDate::from_ymd_opt(2023, 12, 20).unwrap(),
                    responsible: "Mestre Silva".into(),
                    initial_volume: *liters,
                    notes: String::new(),
                    origin: BatchOrigin::Prepared,
                })
                .unwrap();
        }
        ledger
    }

    fn command(usage: &str, ending: f64, attendees: i64) -> RecordSession {
        RecordSession {
            registered_at: Utc.with_ymd_and_hms(2024, 1, 7, 21, 0, 0).unwrap(),
            name: "Sessão de Escala".into(),
            session_date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
            presiding: "Mestre Silva".into(),
            topic: "Chamadas".into(),
            readings: "Boletim 12".into(),
            preparer: "Ana".into(),
            attendees,
            usage: usage.into(),
            ending_volume: ending,
            return_batch: None,
        }
    }

    fn remaining(ledger: &Ledger, id: &str) -> f64 {
        ledger.lookup(&batch_id(id)).map(Batch::remaining_volume).unwrap()
    }

    #[test]
    fn records_session_and_debits_batch() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0)]);
        let recording = record_session(&mut ledger, &command("A:4.5", 2.0, 5)).unwrap();

        assert_eq!(remaining(&ledger, "A"), 5.5);
        let s = &recording.session;
        assert_eq!(s.starting_volume, 4.5);
        assert_eq!(s.ending_volume, 2.0);
        assert_eq!(s.consumed_volume, 2.5);
        assert_eq!(s.per_attendee_ml, 500.0);
        assert_eq!(s.usage.as_str(), "A:4.5");
        assert_eq!(recording.ledger_events.len(), 1);
    }

    #[test]
    fn unknown_batch_aborts_without_debiting_earlier_entries() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0)]);
        let before = ledger.clone();

        let err = record_session(&mut ledger, &command("A:4.5|B:3.0", 2.0, 5)).unwrap_err();
        assert_eq!(err, DomainError::BatchNotFound("B".into()));
        assert_eq!(remaining(&ledger, "A"), 10.0);
        assert_eq!(ledger, before);
    }

    #[test]
    fn insufficient_volume_aborts_whole_session() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0), ("B", 1.0)]);
        let before = ledger.clone();

        let err = record_session(&mut ledger, &command("A:4|B:2", 1.0, 5)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientVolume { ref batch_id, .. } if batch_id == "B"));
        assert_eq!(ledger, before);
    }

    #[test]
    fn repeated_batch_entries_are_checked_against_their_sum() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 5.0)]);
        let err = record_session(&mut ledger, &command("A:3|A:3", 1.0, 5)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientVolume { .. }));
        assert_eq!(remaining(&ledger, "A"), 5.0);
    }

    #[test]
    fn overdraw_policy_lets_balance_go_negative() {
        let mut ledger = ledger_with(DebitPolicy::AllowOverdraw, &[("A", 1.0)]);
        record_session(&mut ledger, &command("A:3", 1.0, 2)).unwrap();
        assert_eq!(remaining(&ledger, "A"), -2.0);
    }

    #[test]
    fn rejects_bad_input_before_touching_the_ledger() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0)]);
        let before = ledger.clone();

        assert_eq!(
            record_session(&mut ledger, &command("A:4", 1.0, 0)).unwrap_err(),
            DomainError::NonPositiveAttendeeCount(0)
        );
        assert!(matches!(
            record_session(&mut ledger, &command("A:4", -1.0, 3)).unwrap_err(),
            DomainError::InvalidNumericField { field: "ending_volume", .. }
        ));
        assert!(matches!(
            record_session(&mut ledger, &command("A:4", 5.0, 3)).unwrap_err(),
            DomainError::InvalidNumericField { field: "ending_volume", .. }
        ));
        assert!(matches!(
            record_session(&mut ledger, &command("A=4", 1.0, 3)).unwrap_err(),
            DomainError::MalformedUsageEntry { .. }
        ));
        assert!(matches!(
            record_session(&mut ledger, &command("||", 0.0, 3)).unwrap_err(),
            DomainError::Validation(_)
        ));
        assert_eq!(ledger, before);
    }

    #[test]
    fn leftover_becomes_return_batch() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0)]);
        let mut cmd = command("A:4.5", 2.0, 5);
        cmd.return_batch = Some(batch_id("R-1"));

        let recording = record_session(&mut ledger, &cmd).unwrap();
        assert_eq!(recording.ledger_events.len(), 2);

        let returned = ledger.lookup(&batch_id("R-1")).unwrap();
        assert_eq!(returned.initial_volume(), 2.0);
        assert_eq!(returned.remaining_volume(), 2.0);
        assert_eq!(returned.responsible(), RETURN_RESPONSIBLE);
        assert_eq!(returned.prepared_on(), NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(
            returned.origin(),
            &BatchOrigin::SessionReturn {
                session_name: "Sessão de Escala".into()
            }
        );
        assert_eq!(returned.notes(), "Return from session: Sessão de Escala");
    }

    #[test]
    fn duplicate_return_batch_aborts_everything() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0), ("R-1", 0.7)]);
        let before = ledger.clone();
        let mut cmd = command("A:4.5", 2.0, 5);
        cmd.return_batch = Some(batch_id("R-1"));

        let err = record_session(&mut ledger, &cmd).unwrap_err();
        assert_eq!(err, DomainError::DuplicateBatchId("R-1".into()));
        assert_eq!(ledger, before);
    }

    #[test]
    fn no_return_batch_when_nothing_is_left() {
        let mut ledger = ledger_with(DebitPolicy::Enforce, &[("A", 10.0)]);
        let mut cmd = command("A:4.5", 0.0, 5);
        cmd.return_batch = Some(batch_id("R-1"));

        record_session(&mut ledger, &cmd).unwrap();
        assert!(!ledger.contains(&batch_id("R-1")));
    }

    #[test]
    fn referenced_batches_include_the_return_batch() {
        let mut cmd = command("A:1|B:2|A:1", 0.5, 5);
        cmd.return_batch = Some(batch_id("R"));
        let ids: Vec<String> = cmd
            .referenced_batches()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["A", "B", "R"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every successful recording satisfies consumed == starting - ending
        /// and the per-attendee formula.
        #[test]
        fn derived_metrics_hold_for_every_recording(
            draws in prop::collection::vec(1u32..500u32, 1..5),
            left_pct in 0u32..=100u32,
            attendees in 1i64..200i64,
        ) {
            let draws: Vec<f64> = draws.into_iter().map(|d| f64::from(d) / 10.0).collect();
            let total: f64 = draws.iter().sum();
            let ending = (total * f64::from(left_pct) / 100.0).min(total);

            let usage = draws
                .iter()
                .enumerate()
                .map(|(i, q)| format!("B{i}:{q}"))
                .collect::<Vec<_>>()
                .join("|");
            let batches: Vec<(String, f64)> = draws
                .iter()
                .enumerate()
                .map(|(i, q)| (format!("B{i}"), *q))
                .collect();
            let batch_refs: Vec<(&str, f64)> = batches.iter().map(|(id, q)| (id.as_str(), *q)).collect();

            let mut ledger = ledger_with(DebitPolicy::Enforce, &batch_refs);
            let recording = record_session(&mut ledger, &command(&usage, ending, attendees)).unwrap();
            let s = recording.session;

            prop_assert_eq!(s.consumed_volume, s.starting_volume - s.ending_volume);
            prop_assert_eq!(s.per_attendee_ml, s.consumed_volume * 1000.0 / attendees as f64);
            prop_assert!(ledger.total_remaining().abs() < 1e-6);
        }
    }
}
