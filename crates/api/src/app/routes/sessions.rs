use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use brewledger_auth::Permission;
use brewledger_core::SessionId;
use brewledger_infra::LedgerService;

use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(query_sessions).post(record_session))
        .route("/:id", get(get_session).put(update_session).delete(delete_session))
}

fn session_id(path: Result<Path<u64>, PathRejection>) -> Result<SessionId, axum::response::Response> {
    path.map(|Path(id)| SessionId::new(id))
        .map_err(|e| errors::bad_request(format!("invalid session id: {}", e.body_text())))
}

pub async fn query_sessions(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    params: Result<Query<dto::SessionQueryParams>, QueryRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SESSIONS_READ) {
        return resp;
    }
    let filter = match params {
        Ok(Query(params)) => match params.into_filter() {
            Ok(f) => f,
            Err(e) => return errors::domain_error_to_response(e),
        },
        Err(e) => return errors::bad_request(e.body_text()),
    };

    match service.query_sessions(&filter).await {
        Ok(result) => Json(dto::session_query_to_json(&result)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn record_session(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RecordSessionRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SESSIONS_WRITE) {
        return resp;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let cmd = match body.into_command(Utc::now()) {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match service.record_session(cmd).await {
        Ok(session) => (
            StatusCode::CREATED,
            Json(dto::envelope("session", dto::session_to_json(&session))),
        )
            .into_response(),
        Err(e) => errors::recording_error_to_response(e),
    }
}

pub async fn get_session(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    path: Result<Path<u64>, PathRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SESSIONS_READ) {
        return resp;
    }
    let id = match session_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match service.get_session(id).await {
        Ok(session) => Json(dto::envelope("session", dto::session_to_json(&session))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_session(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    path: Result<Path<u64>, PathRejection>,
    body: Result<Json<dto::UpdateSessionRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SESSIONS_WRITE) {
        return resp;
    }
    let id = match session_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let edit = match body.into_edit() {
        Ok(edit) => edit,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match service.update_session(id, &edit).await {
        Ok(session) => Json(dto::envelope("session", dto::session_to_json(&session))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_session(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    path: Result<Path<u64>, PathRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::SESSIONS_WRITE) {
        return resp;
    }
    let id = match session_id(path) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match service.delete_session(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
