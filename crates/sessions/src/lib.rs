//! Session recording domain module.
//!
//! This crate contains the rules for recording tea sessions against the batch
//! ledger: decoding usage encodings, validating and debiting batches, deriving
//! consumption metrics, and filtering recorded sessions. Pure domain logic only
//! (no IO, no HTTP, no storage).

pub mod query;
pub mod recorder;
pub mod session;
pub mod usage;

pub use query::{ConsumptionSummary, SessionFilter, sort_newest_first};
pub use recorder::{RETURN_RESPONSIBLE, RecordSession, Recording, record_session};
pub use session::{Session, SessionEdit, SessionRecord, per_attendee_ml};
pub use usage::{UsageEncoding, UsageEntries, UsageEntry, decode, encode};
