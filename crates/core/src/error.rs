//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (malformed input,
/// ledger invariants, unknown records). Infrastructure concerns belong elsewhere.
///
/// Every variant carries enough context to render a user-facing message naming
/// the failing batch or field.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// An entry of a usage encoding could not be decoded.
    #[error("malformed usage entry '{entry}': {reason}")]
    MalformedUsageEntry { entry: String, reason: String },

    /// A referenced batch does not exist in the ledger.
    #[error("batch '{0}' not found")]
    BatchNotFound(String),

    /// A batch with this identifier already exists.
    #[error("a batch with id '{0}' already exists")]
    DuplicateBatchId(String),

    /// A debit exceeds the batch's remaining volume.
    #[error("batch '{batch_id}' has {available} L remaining, {requested} L requested")]
    InsufficientVolume {
        batch_id: String,
        requested: f64,
        available: f64,
    },

    /// A numeric input (volume, count) was missing, non-finite or out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidNumericField { field: &'static str, reason: String },

    /// Sessions must have at least one attendee.
    #[error("attendee count must be positive (got {0})")]
    NonPositiveAttendeeCount(i64),

    /// A requested session record does not exist.
    #[error("session {0} not found")]
    SessionNotFound(u64),

    /// A calendar date could not be parsed.
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A value failed validation (e.g. blank required text).
    #[error("validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn malformed_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUsageEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_number(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidNumericField {
            field,
            reason: reason.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedUsageEntry { .. } => "malformed_usage_entry",
            Self::BatchNotFound(_) => "batch_not_found",
            Self::DuplicateBatchId(_) => "duplicate_batch_id",
            Self::InsufficientVolume { .. } => "insufficient_volume",
            Self::InvalidNumericField { .. } => "invalid_numeric_field",
            Self::NonPositiveAttendeeCount(_) => "non_positive_attendee_count",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidDate(_) => "invalid_date",
            Self::Validation(_) => "validation_error",
        }
    }
}

/// Require a volume to be finite and non-negative.
pub fn ensure_volume(field: &'static str, value: f64) -> DomainResult<f64> {
    if !value.is_finite() {
        return Err(DomainError::invalid_number(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(DomainError::invalid_number(field, "cannot be negative"));
    }
    Ok(value)
}

/// Require free text to be non-blank, returning it trimmed.
pub fn ensure_text(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}
