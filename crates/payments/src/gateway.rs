//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use common::{Money, OrderId, StoreId};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Lifecycle of a payment intent as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order correlation data attached to an intent at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub order_id: OrderId,
    pub order_number: String,
    pub store_id: StoreId,
}

/// A request to charge an amount for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    pub amount: Money,
    pub currency: String,
    pub metadata: IntentMetadata,
}

/// A payment intent held by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: Money,
    pub currency: String,
    pub status: IntentStatus,
    pub metadata: IntentMetadata,
}

/// Trait for the outbound side of the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an intent the client can complete payment against.
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent, GatewayError>;

    /// Fetches the gateway's current view of an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    intents: HashMap<String, PaymentIntent>,
    next_id: u32,
    unavailable: bool,
}

/// In-memory payment gateway for testing and local runs.
///
/// Intents start in `requires_payment_method`; tests move them along with
/// [`succeed_intent`](Self::succeed_intent) and
/// [`fail_intent`](Self::fail_intent).
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Marks an intent as paid, as if the customer completed checkout.
    pub fn succeed_intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.set_status(intent_id, IntentStatus::Succeeded)
    }

    /// Marks an intent's payment attempt as declined.
    pub fn fail_intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.set_status(intent_id, IntentStatus::RequiresPaymentMethod)
    }

    /// Returns the number of intents created.
    pub fn intent_count(&self) -> usize {
        self.lock().intents.len()
    }

    fn set_status(&self, intent_id: &str, status: IntentStatus) -> Option<PaymentIntent> {
        let mut state = self.lock();
        let intent = state.intents.get_mut(intent_id)?;
        intent.status = status;
        Some(intent.clone())
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.lock();

        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        state.next_id += 1;
        let id = format!("pi_{:06}", state.next_id);
        let intent = PaymentIntent {
            client_secret: format!("{id}_secret_{:04}", state.next_id),
            id: id.clone(),
            amount: request.amount,
            currency: request.currency,
            status: IntentStatus::RequiresPaymentMethod,
            metadata: request.metadata,
        };
        state.intents.insert(id, intent.clone());

        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError> {
        let state = self.lock();

        if state.unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }

        state
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::IntentNotFound(intent_id.to_string()))
    }
}
