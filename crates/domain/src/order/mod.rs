//! Order creation and lifecycle operations.

mod commands;
mod factory;
mod number;
mod service;

pub use commands::{Checkout, CheckoutLine, CheckoutRequest, ContactDetails, PhoneRequirement};
pub use factory::{MAX_NUMBER_ATTEMPTS, OrderFactory};
pub use number::{ORDER_NUMBER_PREFIX, generate_order_number};
pub use service::{OrderService, record_transition};
