//! Shared types for the Miles order core.
//!
//! Identifiers, the money value type, payment methods and the order status
//! state machine live here so that the store, domain and payment crates all
//! agree on a single definition.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{InvalidTransition, OrderStatus, UnknownStatus};
pub use types::{CustomerId, OrderId, PaymentMethod, ProductId, StoreId, UnknownPaymentMethod};
