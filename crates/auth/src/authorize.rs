use std::collections::BTreeSet;

use thiserror::Error;

use crate::{Permission, PrincipalId, Role};

/// A caller resolved for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve effective permissions from the role mapping.
    pub fn from_roles(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions: BTreeSet<String> = roles
            .iter()
            .flat_map(Role::permissions)
            .map(|p| p.as_str().to_string())
            .collect();

        Self {
            principal_id,
            roles,
            permissions: permissions.into_iter().map(Permission::new).collect(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check. No IO.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[&'static str]) -> Principal {
        Principal::from_roles(PrincipalId::new(), roles.iter().map(|r| Role::new(*r)).collect())
    }

    #[test]
    fn admin_is_allowed_everything() {
        let p = principal(&["admin"]);
        assert!(authorize(&p, &Permission::LEDGER_WRITE).is_ok());
        assert!(authorize(&p, &Permission::new("anything.else")).is_ok());
    }

    #[test]
    fn steward_reads_and_writes_ledger_and_sessions() {
        let p = principal(&["steward"]);
        for perm in [
            Permission::LEDGER_READ,
            Permission::LEDGER_WRITE,
            Permission::SESSIONS_READ,
            Permission::SESSIONS_WRITE,
        ] {
            assert!(authorize(&p, &perm).is_ok(), "{perm}");
        }
    }

    #[test]
    fn viewer_cannot_write() {
        let p = principal(&["viewer"]);
        assert!(authorize(&p, &Permission::SESSIONS_READ).is_ok());
        assert_eq!(
            authorize(&p, &Permission::LEDGER_WRITE),
            Err(AuthzError::Forbidden("ledger.write".into()))
        );
    }

    #[test]
    fn unknown_roles_grant_nothing_and_permissions_are_deduplicated() {
        assert!(principal(&["guest"]).permissions.is_empty());
        assert_eq!(principal(&["viewer", "steward"]).permissions.len(), 4);
    }
}
