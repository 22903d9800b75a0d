//! Payment error types.

use common::{OrderId, OrderStatus};
use order_store::StoreError;
use thiserror::Error;

use crate::gateway::IntentStatus;

/// Why a webhook signature was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside the tolerance window")]
    Expired,

    #[error("No signature matched the payload")]
    Mismatch,

    #[error("Webhook secret must not be empty")]
    EmptySecret,
}

/// Failures talking to the payment gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or returned a server error. Retryable.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway has no intent with this id.
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),
}

/// Errors that can occur while creating, confirming or settling payments.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The webhook request could not be authenticated.
    #[error("Invalid webhook signature: {0}")]
    SignatureInvalid(#[from] SignatureError),

    /// The webhook body was not a recognisable event.
    #[error("Malformed webhook event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is in a status that cannot accept a payment.
    #[error("Order {order_id} cannot be paid while {status}")]
    NotPayable { order_id: OrderId, status: OrderStatus },

    /// The intent was created for a different order.
    #[error("Payment intent {intent_id} does not belong to order {order_id}")]
    IntentMismatch { intent_id: String, order_id: OrderId },

    /// The customer has not completed the payment yet.
    #[error("Payment intent {intent_id} has not succeeded (status: {status})")]
    PaymentIncomplete {
        intent_id: String,
        status: IntentStatus,
    },

    /// Payment gateway error.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Order store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
