use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{PrincipalId, Role};

/// Claims carried by a brewledger bearer token once its signature checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Roles granted to the caller; mapped to permissions by [`Role::permissions`].
    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or badly signed token: {0}")]
    Malformed(String),
}

/// Check the claim time window against `now`.
///
/// Signature verification happens in [`crate::jwt`]; this only looks at claims.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued_offset_min: i64, ttl_min: i64) -> (JwtClaims, DateTime<Utc>) {
        let now = Utc::now();
        let issued_at = now + Duration::minutes(issued_offset_min);
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            roles: vec![Role::new("viewer")],
            issued_at,
            expires_at: issued_at + Duration::minutes(ttl_min),
        };
        (claims, now)
    }

    #[test]
    fn accepts_a_current_window() {
        let (c, now) = claims(-1, 10);
        assert_eq!(validate_claims(&c, now), Ok(()));
    }

    #[test]
    fn rejects_expired_future_and_inverted_windows() {
        let (c, now) = claims(-20, 10);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::Expired));

        let (c, now) = claims(5, 10);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));

        let (c, now) = claims(-1, 0);
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::InvalidTimeWindow));
    }
}
