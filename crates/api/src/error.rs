//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, FieldError, OrderError};
use order_store::StoreError;
use payments::{GatewayError, PaymentError};
use serde_json::{Value, json};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Payment or webhook error.
    Payment(PaymentError),
    /// A JSON body that could not be read into the request type.
    InvalidBody(JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Value::Null),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Value::Null),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::InvalidBody(rejection) => json_rejection_to_response(rejection),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = if details.is_null() {
            json!({ "error": message })
        } else {
            json!({ "error": message, "details": details })
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Type errors in the body (wrong type, negative quantity, unknown status)
/// become field errors; syntax and content-type problems keep axum's status.
fn json_rejection_to_response(rejection: JsonRejection) -> (StatusCode, String, Value) {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let field = body_field_error(&err.body_text());
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Invalid request body".to_string(),
                json!({ "fields": [field] }),
            )
        }
        other => (other.status(), other.body_text(), Value::Null),
    }
}

const DATA_ERROR_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// Splits `"items[0].quantity: invalid value..."` into a dotted field path and
/// the serde message. Errors without a path are reported against `body`.
fn body_field_error(text: &str) -> FieldError {
    let detail = text.strip_prefix(DATA_ERROR_PREFIX).unwrap_or(text);
    let detail = detail
        .rsplit_once(" at line ")
        .map_or(detail, |(message, _)| message);

    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            let field = path.replace('[', ".").replace(']', "");
            FieldError::new(field, message)
        }
        _ => FieldError::new("body", detail),
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String, Value) {
    let message = err.to_string();
    match err {
        DomainError::Order(order_err) => match order_err {
            OrderError::ValidationFailed { fields } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Checkout validation failed".to_string(),
                json!({ "fields": fields }),
            ),
            OrderError::ProductUnavailable { product_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                message,
                json!({ "product_id": product_id }),
            ),
            OrderError::InsufficientStock {
                product_id,
                product_name,
                available,
                requested,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                message,
                json!({
                    "product_id": product_id,
                    "product_name": product_name,
                    "available": available,
                    "requested": requested,
                }),
            ),
            OrderError::InvalidTransition(t) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                t.to_string(),
                json!({
                    "current": t.current,
                    "target": t.target,
                    "allowed": t.allowed,
                }),
            ),
            OrderError::CancellationNotAllowed { current } => (
                StatusCode::FORBIDDEN,
                message,
                json!({ "current": current }),
            ),
            OrderError::OrderNumberExhausted { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, message, Value::Null)
            }
        },
        DomainError::OrderNotFound(_) => (StatusCode::NOT_FOUND, message, Value::Null),
        DomainError::Store(store_err) => store_error_to_response(store_err),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String, Value) {
    let message = err.to_string();
    match err {
        PaymentError::SignatureInvalid(_) | PaymentError::MalformedEvent(_) => {
            (StatusCode::BAD_REQUEST, message, Value::Null)
        }
        PaymentError::OrderNotFound(_) => (StatusCode::NOT_FOUND, message, Value::Null),
        PaymentError::NotPayable { status, .. } => (
            StatusCode::CONFLICT,
            message,
            json!({ "current": status }),
        ),
        PaymentError::IntentMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, message, Value::Null)
        }
        PaymentError::PaymentIncomplete { status, .. } => (
            StatusCode::CONFLICT,
            message,
            json!({ "intent_status": status }),
        ),
        PaymentError::Gateway(GatewayError::Unavailable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            message,
            json!({ "retryable": true }),
        ),
        PaymentError::Gateway(GatewayError::IntentNotFound(_)) => {
            (StatusCode::NOT_FOUND, message, Value::Null)
        }
        PaymentError::Store(store_err) => store_error_to_response(store_err),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String, Value) {
    let message = err.to_string();
    match err {
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, message, Value::Null),
        StoreError::StatusConflict { actual, .. } => (
            StatusCode::CONFLICT,
            message,
            json!({ "current": actual }),
        ),
        StoreError::Transition(t) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            t.to_string(),
            json!({ "current": t.current, "allowed": t.allowed }),
        ),
        StoreError::DuplicateOrderNumber(_) => (StatusCode::CONFLICT, message, Value::Null),
        StoreError::CorruptRow(_) | StoreError::Database(_) | StoreError::Migration(_) => {
            tracing::error!(error = %message, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal storage error".to_string(),
                Value::Null,
            )
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection)
    }
}
