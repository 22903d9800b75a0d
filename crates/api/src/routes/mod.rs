//! HTTP route handlers.

pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod webhooks;

use domain::OrderService;
use ::payments::{InMemoryPaymentGateway, SettlementProcessor};

/// Shared application state accessible from all handlers.
pub struct AppState<S, C> {
    pub orders: OrderService<S, C>,
    pub settlement: SettlementProcessor<S, InMemoryPaymentGateway>,
}
