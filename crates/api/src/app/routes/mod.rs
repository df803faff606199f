use axum::{Router, routing::get};

pub mod batches;
pub mod sessions;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/overview", get(system::overview))
        .nest("/batches", batches::router())
        .nest("/sessions", sessions::router())
}
