//! Postgres-backed ledger store.
//!
//! ## Error mapping
//!
//! | sqlx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | unique violation on `batches` | `23505` | `DuplicateBatch` |
//! | serialization failure / deadlock | `40001` / `40P01` | `Concurrency` |
//! | other database errors | any | `Database` |
//! | pool closed / timed out, io | n/a | `Unavailable` |
//!
//! ## Atomicity
//!
//! `apply` runs in one transaction: it locks every batch row the change set
//! touches (in id order, so concurrent writers can't deadlock each other),
//! checks the expected versions against the locked rows, then writes. Any
//! error drops the transaction, which rolls it back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use brewledger_core::{AggregateRoot, BatchId, SessionId};
use brewledger_ledger::{Batch, BatchOrigin, LedgerEvent};
use brewledger_sessions::{Session, SessionRecord, UsageEncoding};

use super::{ChangeSet, LedgerStore, StoreError, check_versions};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const BATCH_COLUMNS: &str = "batch_id, prepared_on, responsible, initial_volume, remaining_volume, notes, origin, version";

const SESSION_COLUMNS: &str = "session_id, registered_at, name, session_date, presiding, topic, readings, preparer, \
     attendees, usage, starting_volume, ending_volume, consumed_volume, per_attendee_ml";

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they don't exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), err)]
    async fn list_batches(&self) -> Result<Vec<Batch>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches ORDER BY batch_id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_batches", e))?;

        rows.iter().map(batch_from_row).collect()
    }

    #[instrument(skip(self), fields(batch_id = %id), err)]
    async fn get_batch(&self, id: &BatchId) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE batch_id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_batch", e))?;

        row.as_ref().map(batch_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY registered_at DESC, session_id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sessions", e))?;

        rows.iter().map(session_from_row).collect()
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"))
            .bind(id.get() as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_session", e))?;

        row.as_ref().map(session_from_row).transpose()
    }

    #[instrument(
        skip(self, changes),
        fields(
            event_count = changes.ledger_events.len(),
            new_session = changes.new_session.is_some()
        ),
        err
    )]
    async fn apply(&self, changes: ChangeSet) -> Result<Option<Session>, StoreError> {
        if changes.is_empty() {
            return Ok(None);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut versions = lock_batches(&mut tx, &changes.ledger_events).await?;
        check_versions(&mut versions, &changes.ledger_events)?;

        for event in &changes.ledger_events {
            write_event(&mut tx, event).await?;
        }

        let session = match changes.new_session {
            Some(record) => Some(insert_session(&mut tx, record).await?),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(session)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id), err)]
    async fn update_session(&self, session: &Session) -> Result<bool, StoreError> {
        let s = &session.record;
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                name = $2,
                session_date = $3,
                presiding = $4,
                topic = $5,
                readings = $6,
                preparer = $7,
                attendees = $8,
                usage = $9,
                starting_volume = $10,
                ending_volume = $11,
                consumed_volume = $12,
                per_attendee_ml = $13
            WHERE session_id = $1
            "#,
        )
        .bind(session.id.get() as i64)
        .bind(&s.name)
        .bind(s.session_date)
        .bind(&s.presiding)
        .bind(&s.topic)
        .bind(&s.readings)
        .bind(&s.preparer)
        .bind(s.attendees)
        .bind(s.usage.as_str())
        .bind(s.starting_volume)
        .bind(s.ending_volume)
        .bind(s.consumed_volume)
        .bind(s.per_attendee_ml)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_session", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
            .bind(id.get() as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;

        Ok(result.rows_affected() > 0)
    }
}

/// Lock the rows of every batch the events touch and return their versions.
async fn lock_batches(
    tx: &mut Transaction<'_, Postgres>,
    events: &[LedgerEvent],
) -> Result<BTreeMap<BatchId, u64>, StoreError> {
    let mut ids: Vec<String> = events.iter().map(|e| e.batch_id().to_string()).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let rows = sqlx::query(
        "SELECT batch_id, version FROM batches WHERE batch_id = ANY($1) ORDER BY batch_id FOR UPDATE",
    )
    .bind(ids.as_slice())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_batches", e))?;

    let mut versions = BTreeMap::new();
    for row in rows {
        let id: String = row.try_get("batch_id").map_err(corrupt_row)?;
        let version: i64 = row.try_get("version").map_err(corrupt_row)?;
        versions.insert(parse_batch_id(&id)?, version as u64);
    }
    Ok(versions)
}

async fn write_event(tx: &mut Transaction<'_, Postgres>, event: &LedgerEvent) -> Result<(), StoreError> {
    match event {
        LedgerEvent::BatchRegistered(batch) => {
            let origin = serde_json::to_value(batch.origin())
                .map_err(|e| StoreError::Database(format!("origin serialization failed: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO batches (
                    batch_id, prepared_on, responsible, initial_volume,
                    remaining_volume, notes, origin, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(batch.id_typed().as_str())
            .bind(batch.prepared_on())
            .bind(batch.responsible())
            .bind(batch.initial_volume())
            .bind(batch.remaining_volume())
            .bind(batch.notes())
            .bind(origin)
            .bind(batch.version() as i64)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateBatch(batch.id_typed().to_string())
                } else {
                    map_sqlx_error("insert_batch", e)
                }
            })?;
        }
        LedgerEvent::BatchDebited(e) => {
            let result = sqlx::query(
                r#"
                UPDATE batches
                SET remaining_volume = $2, version = version + 1
                WHERE batch_id = $1 AND version = $3
                "#,
            )
            .bind(e.batch_id.as_str())
            .bind(e.remaining_after)
            .bind(e.expected_version as i64)
            .execute(&mut **tx)
            .await
            .map_err(|err| map_sqlx_error("debit_batch", err))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Concurrency(format!(
                    "batch '{}' changed while debiting",
                    e.batch_id
                )));
            }
        }
        LedgerEvent::BatchRemoved(e) => {
            let result = sqlx::query("DELETE FROM batches WHERE batch_id = $1 AND version = $2")
                .bind(e.batch_id.as_str())
                .bind(e.expected_version as i64)
                .execute(&mut **tx)
                .await
                .map_err(|err| map_sqlx_error("remove_batch", err))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Concurrency(format!(
                    "batch '{}' changed before removal",
                    e.batch_id
                )));
            }
        }
    }
    Ok(())
}

async fn insert_session(
    tx: &mut Transaction<'_, Postgres>,
    record: SessionRecord,
) -> Result<Session, StoreError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sessions (
            registered_at, name, session_date, presiding, topic, readings, preparer,
            attendees, usage, starting_volume, ending_volume, consumed_volume, per_attendee_ml
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING session_id
        "#,
    )
    .bind(record.registered_at)
    .bind(&record.name)
    .bind(record.session_date)
    .bind(&record.presiding)
    .bind(&record.topic)
    .bind(&record.readings)
    .bind(&record.preparer)
    .bind(record.attendees)
    .bind(record.usage.as_str())
    .bind(record.starting_volume)
    .bind(record.ending_volume)
    .bind(record.consumed_volume)
    .bind(record.per_attendee_ml)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_session", e))?;

    Ok(record.with_id(SessionId::new(id as u64)))
}

fn batch_from_row(row: &PgRow) -> Result<Batch, StoreError> {
    let id: String = row.try_get("batch_id").map_err(corrupt_row)?;
    let prepared_on: NaiveDate = row.try_get("prepared_on").map_err(corrupt_row)?;
    let origin: serde_json::Value = row.try_get("origin").map_err(corrupt_row)?;
    let origin: BatchOrigin = serde_json::from_value(origin)
        .map_err(|e| StoreError::Database(format!("unreadable batch origin: {e}")))?;
    let version: i64 = row.try_get("version").map_err(corrupt_row)?;

    Ok(Batch::restore(
        parse_batch_id(&id)?,
        prepared_on,
        row.try_get("responsible").map_err(corrupt_row)?,
        row.try_get("initial_volume").map_err(corrupt_row)?,
        row.try_get("remaining_volume").map_err(corrupt_row)?,
        row.try_get("notes").map_err(corrupt_row)?,
        origin,
        version as u64,
    ))
}

fn session_from_row(row: &PgRow) -> Result<Session, StoreError> {
    let id: i64 = row.try_get("session_id").map_err(corrupt_row)?;
    let registered_at: DateTime<Utc> = row.try_get("registered_at").map_err(corrupt_row)?;
    let usage: String = row.try_get("usage").map_err(corrupt_row)?;
    let usage = UsageEncoding::parse(&usage)
        .map_err(|e| StoreError::Database(format!("session {id} has unreadable usage: {e}")))?;

    let record = SessionRecord {
        registered_at,
        name: row.try_get("name").map_err(corrupt_row)?,
        session_date: row.try_get("session_date").map_err(corrupt_row)?,
        presiding: row.try_get("presiding").map_err(corrupt_row)?,
        topic: row.try_get("topic").map_err(corrupt_row)?,
        readings: row.try_get("readings").map_err(corrupt_row)?,
        preparer: row.try_get("preparer").map_err(corrupt_row)?,
        attendees: row.try_get("attendees").map_err(corrupt_row)?,
        usage,
        starting_volume: row.try_get("starting_volume").map_err(corrupt_row)?,
        ending_volume: row.try_get("ending_volume").map_err(corrupt_row)?,
        consumed_volume: row.try_get("consumed_volume").map_err(corrupt_row)?,
        per_attendee_ml: row.try_get("per_attendee_ml").map_err(corrupt_row)?,
    };
    Ok(record.with_id(SessionId::new(id as u64)))
}

fn parse_batch_id(raw: &str) -> Result<BatchId, StoreError> {
    BatchId::new(raw).map_err(|e| StoreError::Database(format!("stored batch id '{raw}' is invalid: {e}")))
}

fn corrupt_row(err: sqlx::Error) -> StoreError {
    StoreError::Database(format!("failed to decode row: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
