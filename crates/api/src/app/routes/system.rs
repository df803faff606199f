use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use brewledger_auth::Permission;
use brewledger_infra::LedgerService;

use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "principal_id": principal.principal_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}

pub async fn overview(
    Extension(service): Extension<LedgerService>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require(&principal, &Permission::LEDGER_READ) {
        return resp;
    }

    match service.overview().await {
        Ok(overview) => Json(dto::overview_to_json(&overview)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
