//! Domain error types.

use common::{InvalidTransition, OrderId, OrderStatus, ProductId};
use order_store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// A single rejected checkout field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Business-rule and validation failures for orders.
#[derive(Debug, Error)]
pub enum OrderError {
    /// One or more checkout fields were malformed or missing.
    #[error("Checkout validation failed on {} field(s)", .fields.len())]
    ValidationFailed { fields: Vec<FieldError> },

    /// The product does not exist in this store or is not active.
    #[error("Product {product_id} is not available")]
    ProductUnavailable { product_id: ProductId },

    /// Requested more units than are currently in stock.
    #[error("Insufficient stock for {product_name}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// The status change is not in the transition table.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Customers may only cancel their own pending orders.
    #[error("Order cannot be cancelled by the customer while {current}")]
    CancellationNotAllowed { current: OrderStatus },

    /// Could not find an unused order number.
    #[error("Could not generate a unique order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: usize },
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the order rules.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An error occurred in the order store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => DomainError::OrderNotFound(id),
            StoreError::Transition(t) => DomainError::Order(OrderError::InvalidTransition(t)),
            other => DomainError::Store(other),
        }
    }
}

impl From<InvalidTransition> for DomainError {
    fn from(err: InvalidTransition) -> Self {
        DomainError::Order(OrderError::InvalidTransition(err))
    }
}
