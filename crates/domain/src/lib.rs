//! Domain layer for the Miles order core.
//!
//! This crate provides:
//! - Checkout validation and the order factory
//! - Order number generation
//! - The store-owner and customer order services built on the status state machine
//! - The notifier port and its logging and recording implementations

pub mod error;
pub mod notifier;
pub mod order;

pub use error::{DomainError, FieldError, OrderError};
pub use notifier::{
    LoggingNotifier, Notification, Notifications, Notifier, NotifyError, RecordingNotifier,
};
pub use order::{
    Checkout, CheckoutLine, CheckoutRequest, ContactDetails, MAX_NUMBER_ATTEMPTS, OrderFactory,
    OrderService, PhoneRequirement, generate_order_number, record_transition,
};
