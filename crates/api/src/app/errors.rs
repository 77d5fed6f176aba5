use core::str::FromStr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use clinicflow_core::DomainError;
use clinicflow_infra::{ServiceError, ServiceResult, StoreError};

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Store(StoreError::Contention { attempts }) => json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "contention",
            format!("operation gave up after {attempts} conflicting attempts; retry later"),
        ),
        ServiceError::Store(e @ StoreError::Conflict { .. }) => {
            json_error(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        ServiceError::Store(StoreError::Poisoned) => {
            error!("store lock poisoned");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "store unavailable")
        }
        ServiceError::Store(StoreError::Backend(message)) => {
            error!(error = %message, "durable store failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "store unavailable")
        }
        ServiceError::Aborted(message) => {
            error!(error = %message, "service call aborted");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "request could not be completed")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    let (status, code) = match &err {
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::InsufficientStock(_) => (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock"),
        DomainError::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "payment_required"),
        DomainError::Unauthorized(_) => (StatusCode::FORBIDDEN, "forbidden"),
        DomainError::InvariantViolation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation"),
    };
    json_error(status, code, err.message())
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Serialize a successful result with `status`, or map the failure.
pub fn respond<T: Serialize>(status: StatusCode, result: ServiceResult<T>) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// Parse a path/query value that must be one of the domain's strict enums or ids.
pub fn parse<T>(raw: &str) -> Result<T, Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}
