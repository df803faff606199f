use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role name as carried in the token.
///
/// Unknown roles are kept (they show up in `/whoami`) but grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const STEWARD: &'static str = "steward";
    pub const VIEWER: &'static str = "viewer";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permissions granted by this role.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            Self::ADMIN => vec![Permission::ALL],
            Self::STEWARD => vec![
                Permission::LEDGER_READ,
                Permission::LEDGER_WRITE,
                Permission::SESSIONS_READ,
                Permission::SESSIONS_WRITE,
            ],
            Self::VIEWER => vec![Permission::LEDGER_READ, Permission::SESSIONS_READ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
