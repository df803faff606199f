use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use brewledger_core::{DomainError, DomainResult, SessionId, ensure_text, ensure_volume};

use crate::usage::UsageEncoding;

/// Milliliters per liter.
const ML_PER_LITER: f64 = 1000.0;

/// Per-attendee consumption in milliliters; 0 when there are no attendees.
pub fn per_attendee_ml(consumed_volume: f64, attendees: i64) -> f64 {
    if attendees <= 0 {
        return 0.0;
    }
    consumed_volume * ML_PER_LITER / attendees as f64
}

/// A session as recorded, before the store assigns its id.
///
/// Field list is the serialization contract (schema version 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub registered_at: DateTime<Utc>,
    pub name: String,
    pub session_date: NaiveDate,
    pub presiding: String,
    pub topic: String,
    pub readings: String,
    pub preparer: String,
    pub attendees: i64,
    pub usage: UsageEncoding,
    pub starting_volume: f64,
    pub ending_volume: f64,
    pub consumed_volume: f64,
    pub per_attendee_ml: f64,
}

impl SessionRecord {
    pub fn with_id(self, id: SessionId) -> Session {
        Session { id, record: self }
    }
}

/// A persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// Direct edit of a recorded session.
///
/// Edits never touch the ledger: changing quantities or usage here does not
/// debit or credit any batch. Derived metrics are recomputed from the edited
/// volumes so `consumed == starting - ending` keeps holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEdit {
    pub name: String,
    pub session_date: NaiveDate,
    pub presiding: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub readings: String,
    pub preparer: String,
    pub attendees: i64,
    pub usage: String,
    pub starting_volume: f64,
    pub ending_volume: f64,
}

impl Session {
    pub fn apply_edit(&mut self, edit: &SessionEdit) -> DomainResult<()> {
        let usage = UsageEncoding::parse(&edit.usage)?;
        let (consumed, per_attendee) =
            derive_consumption(edit.starting_volume, edit.ending_volume, edit.attendees)?;

        let name = ensure_text("name", &edit.name)?;
        let presiding = ensure_text("presiding", &edit.presiding)?;
        let preparer = ensure_text("preparer", &edit.preparer)?;

        let record = &mut self.record;
        record.name = name;
        record.session_date = edit.session_date;
        record.presiding = presiding;
        record.topic = edit.topic.trim().to_string();
        record.readings = edit.readings.trim().to_string();
        record.preparer = preparer;
        record.attendees = edit.attendees;
        record.usage = usage;
        record.starting_volume = edit.starting_volume;
        record.ending_volume = edit.ending_volume;
        record.consumed_volume = consumed;
        record.per_attendee_ml = per_attendee;
        Ok(())
    }
}

/// Validate volumes and attendee count and derive (consumed, ml per attendee).
pub(crate) fn derive_consumption(
    starting_volume: f64,
    ending_volume: f64,
    attendees: i64,
) -> DomainResult<(f64, f64)> {
    if attendees <= 0 {
        return Err(DomainError::NonPositiveAttendeeCount(attendees));
    }
    let starting = ensure_volume("starting_volume", starting_volume)?;
    let ending = ensure_volume("ending_volume", ending_volume)?;
    if ending > starting {
        return Err(DomainError::invalid_number(
            "ending_volume",
            format!("{ending} L left over exceeds the {starting} L drawn"),
        ));
    }

    let consumed = starting - ending;
    Ok((consumed, per_attendee_ml(consumed, attendees)))
}
