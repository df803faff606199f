use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use brewledger_auth::Permission;
use brewledger_core::BatchId;
use brewledger_infra::LedgerService;

use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_batches).post(register_batch))
        .route("/:id", get(get_batch).delete(remove_batch))
}

pub async fn list_batches(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::LEDGER_READ) {
        return resp;
    }

    match service.list_batches().await {
        Ok(batches) => Json(dto::envelope(
            "batches",
            batches.iter().map(dto::batch_to_json).collect(),
        ))
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn register_batch(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RegisterBatchRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::LEDGER_WRITE) {
        return resp;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let cmd = match body.into_command() {
        Ok(cmd) => cmd,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match service.register_batch(cmd).await {
        Ok(batch) => (
            StatusCode::CREATED,
            Json(dto::envelope("batch", dto::batch_to_json(&batch))),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_batch(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::LEDGER_READ) {
        return resp;
    }
    let id = match BatchId::new(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match service.lookup_batch(&id).await {
        Ok(batch) => Json(dto::envelope("batch", dto::batch_to_json(&batch))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn remove_batch(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::LEDGER_WRITE) {
        return resp;
    }
    let id = match BatchId::new(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match service.remove_batch(&id).await {
        Ok(removed) => Json(dto::envelope("removed", dto::batch_to_json(&removed))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
