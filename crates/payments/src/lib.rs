//! Payment settlement for the Miles order core.
//!
//! This crate provides:
//! - The payment gateway port and an in-memory gateway for tests
//! - Webhook signature verification and event parsing
//! - The settlement processor that marks orders paid and deducts stock
//!   exactly once, whether triggered by webhook or client confirmation

pub mod error;
pub mod gateway;
pub mod settlement;
pub mod webhook;

pub use error::{GatewayError, PaymentError, SignatureError};
pub use gateway::{
    CreateIntent, InMemoryPaymentGateway, IntentMetadata, IntentStatus, PaymentGateway,
    PaymentIntent,
};
pub use settlement::{PaymentStatus, SettlementConfig, SettlementOutcome, SettlementProcessor};
pub use webhook::{PaymentEvent, SIGNATURE_HEADER, WebhookEvent, WebhookVerifier};
