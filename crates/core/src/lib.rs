//! `brewledger-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod date;
pub mod error;
pub mod id;

pub use aggregate::AggregateRoot;
pub use error::{DomainError, DomainResult, ensure_text, ensure_volume};
pub use id::{BatchId, SessionId};
