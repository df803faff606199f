//! Batch ledger domain module.
//!
//! This crate owns the business rules for inventory batches and their remaining
//! volumes, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage). Stores persist the [`LedgerEvent`]s it emits.

pub mod batch;
pub mod ledger;

pub use batch::{Batch, BatchOrigin, DebitPolicy, RegisterBatch, VOLUME_EPSILON};
pub use ledger::{BatchDebited, BatchRemoved, Ledger, LedgerEvent, LedgerTransaction};
