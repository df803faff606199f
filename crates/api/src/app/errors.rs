use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use brewledger_core::DomainError;
use brewledger_infra::ServiceError;

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

/// Like [`service_error_to_response`], except an unknown batch is a problem
/// with the submitted usage (422), not a missing resource.
pub fn recording_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e @ DomainError::BatchNotFound(_)) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, e.code(), e.to_string())
        }
        other => service_error_to_response(other),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::BatchNotFound(_) | DomainError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::DuplicateBatchId(_) => StatusCode::CONFLICT,
        DomainError::InsufficientVolume { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::MalformedUsageEntry { .. }
        | DomainError::InvalidNumericField { .. }
        | DomainError::NonPositiveAttendeeCount(_)
        | DomainError::InvalidDate(_)
        | DomainError::Validation(_) => StatusCode::BAD_REQUEST,
    };
    json_error(status, err.code(), err.to_string())
}

/// Request body that could not be read as the expected JSON.
pub fn json_rejection_to_response(rejection: JsonRejection) -> axum::response::Response {
    let status = match &rejection {
        JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::BAD_REQUEST,
    };
    json_error(status, "validation_error", rejection.body_text())
}

/// Malformed query string or path segment.
pub fn bad_request(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
