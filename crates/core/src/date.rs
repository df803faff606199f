//! Calendar dates at the system boundary.
//!
//! Internally every date is a [`NaiveDate`]. Input arrives as ISO `YYYY-MM-DD`;
//! human-facing output uses `DD/MM/YYYY`. Conversion happens only here.

use chrono::NaiveDate;

use crate::error::{DomainError, DomainResult};

const ISO_FORMAT: &str = "%Y-%m-%d";
const DISPLAY_FORMAT: &str = "%d/%m/%Y";

/// Parse an ISO calendar date (`2024-01-31`).
pub fn parse_iso(raw: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), ISO_FORMAT)
        .map_err(|_| DomainError::InvalidDate(raw.to_string()))
}

/// Render a date the way it is shown to people (`31/01/2024`).
pub fn display(date: NaiveDate) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

/// Parse an optional ISO date from a query or form field; blank means absent.
pub fn parse_iso_opt(raw: Option<&str>) -> DomainResult<Option<NaiveDate>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_iso(s).map(Some),
    }
}
