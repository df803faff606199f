//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Characters reserved by the usage encoding (`id:qty|id:qty`).
pub const RESERVED_ID_CHARS: [char; 2] = [':', '|'];

/// Identifier of an inventory batch (human-assigned, unique).
///
/// Batch ids appear verbatim inside usage encodings, so they can never contain
/// the encoding's delimiters and are never blank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

impl BatchId {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("batch id cannot be empty"));
        }
        if trimmed.contains(RESERVED_ID_CHARS) {
            return Err(DomainError::validation(format!(
                "batch id '{trimmed}' cannot contain ':' or '|'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BatchId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BatchId> for String {
    fn from(value: BatchId) -> Self {
        value.0
    }
}

/// Identifier of a recorded session (assigned by the store on insert).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for SessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::validation(format!("SessionId: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn batch_id_is_trimmed() {
        let id = BatchId::new("  L-2024-01 ").unwrap();
        assert_eq!(id.as_str(), "L-2024-01");
    }

    #[test]
    fn batch_id_rejects_delimiters_and_blanks() {
        assert!(BatchId::new("").is_err());
        assert!(BatchId::new("   ").is_err());
        assert!(BatchId::new("A:1").is_err());
        assert!(BatchId::new("A|B").is_err());
    }

    #[test]
    fn batch_id_deserialization_is_validated() {
        let ok: BatchId = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(ok.as_str(), "A");
        assert!(serde_json::from_str::<BatchId>("\"A|B\"").is_err());
    }

    #[test]
    fn session_id_parses_from_path_segments() {
        assert_eq!("42".parse::<SessionId>().unwrap(), SessionId::new(42));
        assert!("abc".parse::<SessionId>().is_err());
    }

    proptest! {
        #[test]
        fn ids_containing_a_delimiter_never_validate(
            prefix in "[A-Za-z0-9-]{0,8}",
            delimiter in prop::sample::select(RESERVED_ID_CHARS.to_vec()),
            suffix in "[A-Za-z0-9-]{0,8}",
        ) {
            let raw = format!("{prefix}{delimiter}{suffix}");
            prop_assert!(BatchId::new(&raw).is_err());
        }

        #[test]
        fn accepted_ids_survive_display_and_parse(raw in "[^:|]{1,16}") {
            match BatchId::new(&raw) {
                Ok(id) => {
                    prop_assert_eq!(id.as_str(), raw.trim());
                    prop_assert!(id.to_string().parse::<BatchId>().unwrap() == id);
                }
                Err(_) => prop_assert!(raw.trim().is_empty()),
            }
        }
    }
}
