//! Usage encoding codec.
//!
//! A session's batch usage is persisted and transmitted as `id1:qty1|id2:qty2`.
//! Quantities are liters in the locale-invariant decimal form understood by
//! `f64::from_str`. Batch ids can never contain `:` or `|` (see [`BatchId`]),
//! so no escaping is needed.

use serde::{Deserialize, Serialize};

use brewledger_core::{BatchId, DomainError, DomainResult};

pub const ENTRY_DELIMITER: char = '|';
pub const FIELD_DELIMITER: char = ':';

/// One (batch, quantity) pair drawn by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub batch_id: BatchId,
    pub quantity: f64,
}

impl UsageEntry {
    pub fn new(batch_id: BatchId, quantity: f64) -> Self {
        Self { batch_id, quantity }
    }
}

/// Lazily decode a usage encoding.
///
/// Empty entries (leading, trailing or doubled `|`) are skipped. Each malformed
/// entry yields a [`DomainError::MalformedUsageEntry`].
pub fn decode(text: &str) -> UsageEntries<'_> {
    UsageEntries {
        parts: text.split(ENTRY_DELIMITER),
    }
}

/// Render entries in canonical form.
pub fn encode<'a>(entries: impl IntoIterator<Item = &'a UsageEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        if !out.is_empty() {
            out.push(ENTRY_DELIMITER);
        }
        out.push_str(entry.batch_id.as_str());
        out.push(FIELD_DELIMITER);
        out.push_str(&entry.quantity.to_string());
    }
    out
}

/// Iterator returned by [`decode`].
#[derive(Debug, Clone)]
pub struct UsageEntries<'a> {
    parts: core::str::Split<'a, char>,
}

impl Iterator for UsageEntries<'_> {
    type Item = DomainResult<UsageEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.parts.next()?;
            if raw.trim().is_empty() {
                continue;
            }
            return Some(parse_entry(raw));
        }
    }
}

fn parse_entry(raw: &str) -> DomainResult<UsageEntry> {
    let entry = raw.trim();
    let (id, quantity) = entry
        .split_once(FIELD_DELIMITER)
        .ok_or_else(|| DomainError::malformed_entry(entry, "missing ':' between batch id and quantity"))?;

    if quantity.contains(FIELD_DELIMITER) {
        return Err(DomainError::malformed_entry(entry, "more than one ':'"));
    }

    let batch_id = BatchId::new(id).map_err(|_| DomainError::malformed_entry(entry, "empty batch id"))?;

    let quantity: f64 = quantity
        .trim()
        .parse()
        .map_err(|_| DomainError::malformed_entry(entry, "quantity is not a number"))?;

    if !quantity.is_finite() {
        return Err(DomainError::malformed_entry(entry, "quantity must be finite"));
    }
    if quantity < 0.0 {
        return Err(DomainError::malformed_entry(entry, "quantity cannot be negative"));
    }

    Ok(UsageEntry { batch_id, quantity })
}

/// A decoded, canonicalised usage encoding.
///
/// Serialized as its canonical string; deserialization re-validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsageEncoding {
    canonical: String,
    entries: Vec<UsageEntry>,
}

impl UsageEncoding {
    /// Decode eagerly, failing on the first malformed entry.
    pub fn parse(text: &str) -> DomainResult<Self> {
        let entries = decode(text).collect::<DomainResult<Vec<_>>>()?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<UsageEntry>) -> Self {
        Self {
            canonical: encode(&entries),
            entries,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct batch ids, in order of first appearance.
    pub fn batch_ids(&self) -> Vec<BatchId> {
        let mut ids: Vec<BatchId> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !ids.contains(&entry.batch_id) {
                ids.push(entry.batch_id.clone());
            }
        }
        ids
    }

    /// Sum of all quantities drawn.
    pub fn total_quantity(&self) -> f64 {
        self.entries.iter().map(|e| e.quantity).sum()
    }
}

impl core::fmt::Display for UsageEncoding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl TryFrom<String> for UsageEncoding {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UsageEncoding> for String {
    fn from(value: UsageEncoding) -> Self {
        value.canonical
    }
}
