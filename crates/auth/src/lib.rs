//! `brewledger-auth`: authentication and authorization boundary.
//!
//! Decoupled from HTTP and storage. The API layer turns a bearer token into
//! [`JwtClaims`] through a [`JwtValidator`] and checks each operation with
//! [`authorize`].

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
