//! HTTP application wiring (axum router + service wiring).
//!
//! - `services.rs`: picks and prepares the ledger store from configuration
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request DTOs and JSON mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use brewledger_infra::LedgerService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router around an already wired service.
pub fn build_app(jwt_secret: String, service: LedgerService) -> Router {
    let jwt = Arc::new(brewledger_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Everything except /health requires a bearer token.
    let protected = routes::router()
        .layer(Extension(service))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
