use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use brewledger_core::{AggregateRoot, BatchId, DomainError, DomainResult, date};
use brewledger_infra::{Overview, SessionQuery};
use brewledger_ledger::{Batch, BatchOrigin, RegisterBatch};
use brewledger_sessions::{ConsumptionSummary, RecordSession, Session, SessionEdit, SessionFilter};

/// Version of the JSON shapes below.
pub const SCHEMA_VERSION: u32 = 1;

// -------------------------
// Request DTOs
// -------------------------

/// A volume or count as sent by clients: a JSON number, or numeric text such
/// as `"1.5"`. Anything else is rejected as `invalid_numeric_field`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Number(serde_json::Number),
    Text(String),
}

impl NumberField {
    pub fn volume(&self, field: &'static str) -> DomainResult<f64> {
        match self {
            NumberField::Number(n) => n
                .as_f64()
                .ok_or_else(|| DomainError::invalid_number(field, format!("'{n}' is out of range"))),
            NumberField::Text(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| DomainError::invalid_number(field, format!("'{raw}' is not a number"))),
        }
    }

    pub fn count(&self, field: &'static str) -> DomainResult<i64> {
        if let NumberField::Number(n) = self {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
        }
        let value = self.volume(field)?;
        if value.fract() != 0.0 || !value.is_finite() || value.abs() > i64::MAX as f64 {
            return Err(DomainError::invalid_number(
                field,
                format!("{value} is not a whole number"),
            ));
        }
        Ok(value as i64)
    }
}

impl From<f64> for NumberField {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map(NumberField::Number)
            .unwrap_or_else(|| NumberField::Text(value.to_string()))
    }
}

impl From<i64> for NumberField {
    fn from(value: i64) -> Self {
        NumberField::Number(value.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterBatchRequest {
    pub batch_id: String,
    /// ISO date (`YYYY-MM-DD`).
    pub prepared_on: String,
    pub responsible: String,
    pub initial_volume: NumberField,
    #[serde(default)]
    pub notes: String,
}

impl RegisterBatchRequest {
    pub fn into_command(self) -> DomainResult<RegisterBatch> {
        Ok(RegisterBatch {
            batch_id: BatchId::new(&self.batch_id)?,
            prepared_on: date::parse_iso(&self.prepared_on)?,
            responsible: self.responsible,
            initial_volume: self.initial_volume.volume("initial_volume")?,
            notes: self.notes,
            origin: BatchOrigin::Prepared,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordSessionRequest {
    pub name: String,
    /// ISO date (`YYYY-MM-DD`).
    pub session_date: String,
    pub presiding: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub readings: String,
    pub preparer: String,
    pub attendees: NumberField,
    pub usage: String,
    pub ending_volume: NumberField,
    /// Turn the leftover into a new batch.
    #[serde(default)]
    pub register_return: bool,
    pub return_batch_id: Option<String>,
}

impl RecordSessionRequest {
    pub fn into_command(self, registered_at: DateTime<Utc>) -> DomainResult<RecordSession> {
        let session_date = date::parse_iso(&self.session_date)?;
        let attendees = self.attendees.count("attendees")?;
        let ending_volume = self.ending_volume.volume("ending_volume")?;

        // Nothing to return when the session used everything up.
        let return_batch = if self.register_return && ending_volume > 0.0 {
            match self.return_batch_id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => Some(BatchId::new(id)?),
                _ => {
                    return Err(DomainError::validation(
                        "return_batch_id is required when register_return is set",
                    ));
                }
            }
        } else {
            None
        };

        Ok(RecordSession {
            registered_at,
            name: self.name,
            session_date,
            presiding: self.presiding,
            topic: self.topic,
            readings: self.readings,
            preparer: self.preparer,
            attendees,
            usage: self.usage,
            ending_volume,
            return_batch,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub name: String,
    pub session_date: String,
    pub presiding: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub readings: String,
    pub preparer: String,
    pub attendees: NumberField,
    #[serde(default)]
    pub usage: String,
    pub starting_volume: NumberField,
    pub ending_volume: NumberField,
}

impl UpdateSessionRequest {
    pub fn into_edit(self) -> DomainResult<SessionEdit> {
        Ok(SessionEdit {
            name: self.name,
            session_date: date::parse_iso(&self.session_date)?,
            presiding: self.presiding,
            topic: self.topic,
            readings: self.readings,
            preparer: self.preparer,
            attendees: self.attendees.count("attendees")?,
            usage: self.usage,
            starting_volume: self.starting_volume.volume("starting_volume")?,
            ending_volume: self.ending_volume.volume("ending_volume")?,
        })
    }
}

/// Query string of `GET /sessions`. Dates are ISO; blank values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct SessionQueryParams {
    pub q: Option<String>,
    pub presiding: Option<String>,
    pub topic: Option<String>,
    pub readings: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl SessionQueryParams {
    pub fn into_filter(self) -> DomainResult<SessionFilter> {
        Ok(SessionFilter {
            from: date::parse_iso_opt(self.from.as_deref())?,
            to: date::parse_iso_opt(self.to.as_deref())?,
            q: self.q,
            presiding: self.presiding,
            topic: self.topic,
            readings: self.readings,
        })
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn batch_to_json(batch: &Batch) -> Value {
    json!({
        "id": batch.id_typed().as_str(),
        "prepared_on": date::display(batch.prepared_on()),
        "responsible": batch.responsible(),
        "initial_volume": batch.initial_volume(),
        "remaining_volume": batch.remaining_volume(),
        "notes": batch.notes(),
        "origin": batch.origin(),
        "drained": batch.is_drained(),
        "version": batch.version(),
    })
}

pub fn session_to_json(session: &Session) -> Value {
    let s = &session.record;
    json!({
        "id": session.id.get(),
        "registered_at": s.registered_at.to_rfc3339(),
        "name": s.name,
        "session_date": date::display(s.session_date),
        "presiding": s.presiding,
        "topic": s.topic,
        "readings": s.readings,
        "preparer": s.preparer,
        "attendees": s.attendees,
        "usage": s.usage.as_str(),
        "starting_volume": s.starting_volume,
        "ending_volume": s.ending_volume,
        "consumed_volume": s.consumed_volume,
        "per_attendee_ml": s.per_attendee_ml,
    })
}

pub fn summary_to_json(summary: &ConsumptionSummary) -> Value {
    json!({
        "sessions": summary.sessions,
        "attendees": summary.attendees,
        "consumed_volume": summary.consumed_volume,
        "average_per_attendee_ml": summary.average_per_attendee_ml,
    })
}

/// Wrap a payload in the versioned envelope.
pub fn envelope(key: &str, value: Value) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("schema_version".into(), json!(SCHEMA_VERSION));
    body.insert(key.into(), value);
    Value::Object(body)
}

pub fn overview_to_json(overview: &Overview) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "sessions": overview.sessions.iter().map(session_to_json).collect::<Vec<_>>(),
        "batches": overview.batches.iter().map(batch_to_json).collect::<Vec<_>>(),
        "total_remaining": overview.total_remaining,
    })
}

pub fn session_query_to_json(query: &SessionQuery) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "sessions": query.sessions.iter().map(session_to_json).collect::<Vec<_>>(),
        "summary": summary_to_json(&query.summary),
    })
}
