//! Request-side authorization guard.
//!
//! Handlers call [`require`] before touching the service, so the domain and
//! infra crates stay auth-agnostic.

use axum::http::StatusCode;
use axum::response::Response;

use brewledger_auth::{Permission, Principal, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// Check that the caller holds `permission`, or produce the 403 response.
pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), Response> {
    let resolved = Principal::from_roles(principal.principal_id(), principal.roles().to_vec());

    authorize(&resolved, permission).map_err(|e| {
        tracing::warn!(
            principal_id = %principal.principal_id(),
            permission = %permission,
            "request forbidden"
        );
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())
    })
}
