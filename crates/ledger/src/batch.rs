use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use brewledger_core::{AggregateRoot, BatchId, DomainError, DomainResult, ensure_text, ensure_volume};

/// Volumes closer than this are treated as equal (floating-point noise from
/// repeated decimal debits, e.g. `0.3 - 0.1 - 0.2`).
pub const VOLUME_EPSILON: f64 = 1e-9;

/// Whether a debit may take a batch below zero.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitPolicy {
    /// Reject debits larger than the remaining volume.
    #[default]
    Enforce,
    /// Accept any debit; remaining volume may become negative.
    AllowOverdraw,
}

impl core::str::FromStr for DebitPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforce" => Ok(Self::Enforce),
            "allow_overdraw" | "allow-overdraw" => Ok(Self::AllowOverdraw),
            other => Err(DomainError::validation(format!(
                "unknown debit policy '{other}' (expected 'enforce' or 'allow_overdraw')"
            ))),
        }
    }
}

/// Where a batch's liquid came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchOrigin {
    /// Prepared and registered directly.
    #[default]
    Prepared,
    /// Leftover volume returned at the end of a session.
    SessionReturn { session_name: String },
}

/// Aggregate root: Batch (one prepared quantity of liquid).
///
/// Fields are private; the remaining volume changes only through [`Batch::debit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    prepared_on: NaiveDate,
    responsible: String,
    initial_volume: f64,
    remaining_volume: f64,
    notes: String,
    origin: BatchOrigin,
    version: u64,
}

/// Command: RegisterBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterBatch {
    pub batch_id: BatchId,
    pub prepared_on: NaiveDate,
    pub responsible: String,
    pub initial_volume: f64,
    pub notes: String,
    #[serde(default)]
    pub origin: BatchOrigin,
}

impl Batch {
    /// Validate a registration and build the new batch (remaining = initial).
    pub fn register(cmd: &RegisterBatch) -> DomainResult<Self> {
        let initial_volume = ensure_volume("initial_volume", cmd.initial_volume)?;
        let responsible = ensure_text("responsible", &cmd.responsible)?;

        Ok(Self {
            id: cmd.batch_id.clone(),
            prepared_on: cmd.prepared_on,
            responsible,
            initial_volume,
            remaining_volume: initial_volume,
            notes: cmd.notes.trim().to_string(),
            origin: cmd.origin.clone(),
            version: 1,
        })
    }

    /// Rebuild a batch from persisted state (stores only).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: BatchId,
        prepared_on: NaiveDate,
        responsible: String,
        initial_volume: f64,
        remaining_volume: f64,
        notes: String,
        origin: BatchOrigin,
        version: u64,
    ) -> Self {
        Self {
            id,
            prepared_on,
            responsible,
            initial_volume,
            remaining_volume,
            notes,
            origin,
            version,
        }
    }

    pub fn id_typed(&self) -> &BatchId {
        &self.id
    }

    pub fn prepared_on(&self) -> NaiveDate {
        self.prepared_on
    }

    pub fn responsible(&self) -> &str {
        &self.responsible
    }

    pub fn initial_volume(&self) -> f64 {
        self.initial_volume
    }

    pub fn remaining_volume(&self) -> f64 {
        self.remaining_volume
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn origin(&self) -> &BatchOrigin {
        &self.origin
    }

    pub fn is_drained(&self) -> bool {
        self.remaining_volume <= VOLUME_EPSILON
    }

    /// Compute the balance left after debiting `amount`, without mutating.
    pub fn balance_after_debit(&self, amount: f64, policy: DebitPolicy) -> DomainResult<f64> {
        let amount = ensure_volume("quantity", amount)?;

        if policy == DebitPolicy::Enforce && amount - self.remaining_volume > VOLUME_EPSILON {
            return Err(DomainError::InsufficientVolume {
                batch_id: self.id.to_string(),
                requested: amount,
                available: self.remaining_volume,
            });
        }

        let after = self.remaining_volume - amount;
        if after.abs() <= VOLUME_EPSILON {
            return Ok(0.0);
        }
        Ok(after)
    }

    /// Debit the batch by `amount` liters.
    pub fn debit(&mut self, amount: f64, policy: DebitPolicy) -> DomainResult<()> {
        self.remaining_volume = self.balance_after_debit(amount, policy)?;
        self.version += 1;
        Ok(())
    }

    pub(crate) fn set_balance(&mut self, remaining_volume: f64) {
        self.remaining_volume = remaining_volume;
        self.version += 1;
    }
}

impl AggregateRoot for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
