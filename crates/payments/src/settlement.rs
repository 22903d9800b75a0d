//! Settlement of confirmed payments against orders.
//!
//! Webhooks and client confirmations both end in [`OrderStore::settle_payment`],
//! which moves the order to `paid` and deducts stock in one unit. Repeated
//! deliveries for an order that is already settled change nothing.

use std::time::Instant;

use common::{Money, OrderId, OrderStatus};
use domain::{Notification, Notifications, record_transition};
use order_store::{Order, OrderStore, Settlement, StoreError};
use serde::Serialize;

use crate::error::{PaymentError, Result, SignatureError};
use crate::gateway::{CreateIntent, IntentMetadata, IntentStatus, PaymentGateway, PaymentIntent};
use crate::webhook::{PaymentEvent, WebhookEvent, WebhookVerifier};

/// Charge settings for intent creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementConfig {
    /// ISO currency code sent to the gateway.
    pub currency: String,

    /// Smallest amount the gateway will charge; smaller totals are raised to it.
    pub min_charge: Money,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: "myr".to_string(),
            min_charge: Money::from_cents(50),
        }
    }
}

/// What a payment event or confirmation did to its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// The order was marked paid and stock was deducted.
    Settled {
        order_id: OrderId,
        order_number: String,
    },

    /// The order was already paid or further along; nothing changed.
    AlreadySettled {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The customer's payment attempt failed; the order stays pending.
    PaymentFailed { order_id: Option<OrderId> },

    /// The event named no order, or one that no longer exists.
    OrderNotFound { order_id: Option<OrderId> },

    /// A payment arrived for an order that can no longer take one.
    NotPayable {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// An event type settlement does not act on.
    Ignored { kind: String },
}

impl SettlementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled { .. } => "settled",
            SettlementOutcome::AlreadySettled { .. } => "already_settled",
            SettlementOutcome::PaymentFailed { .. } => "payment_failed",
            SettlementOutcome::OrderNotFound { .. } => "order_not_found",
            SettlementOutcome::NotPayable { .. } => "not_payable",
            SettlementOutcome::Ignored { .. } => "ignored",
        }
    }

    /// True when the order ends up paid, whether by this call or an earlier one.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            SettlementOutcome::Settled { .. } | SettlementOutcome::AlreadySettled { .. }
        )
    }
}

/// Payment state of an order, for clients polling after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentStatus {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub paid: bool,
    pub payment_reference: Option<String>,
    pub total_amount: Money,
}

impl From<&Order> for PaymentStatus {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            paid: order.status.is_settled(),
            payment_reference: order.payment_reference.clone(),
            total_amount: order.total_amount,
        }
    }
}

/// Reconciles gateway payments with orders.
pub struct SettlementProcessor<S, G> {
    store: S,
    gateway: G,
    verifier: WebhookVerifier,
    notifications: Notifications,
    config: SettlementConfig,
}

impl<S: OrderStore, G: PaymentGateway> SettlementProcessor<S, G> {
    /// Creates a new settlement processor.
    pub fn new(
        store: S,
        gateway: G,
        verifier: WebhookVerifier,
        notifications: Notifications,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            verifier,
            notifications,
            config,
        }
    }

    /// Returns a reference to the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the verifier used for incoming webhooks.
    pub fn verifier(&self) -> &WebhookVerifier {
        &self.verifier
    }

    /// Creates a gateway intent for a pending order.
    ///
    /// The charged amount is the order total, raised to the gateway minimum.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(&self, order_id: OrderId) -> Result<PaymentIntent> {
        let order = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(PaymentError::NotPayable {
                order_id,
                status: order.status,
            });
        }

        let amount = order.total_amount.max(self.config.min_charge);
        let intent = self
            .gateway
            .create_intent(CreateIntent {
                amount,
                currency: self.config.currency.clone(),
                metadata: IntentMetadata {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    store_id: order.store_id,
                },
            })
            .await?;

        tracing::info!(
            %order_id,
            intent_id = %intent.id,
            amount = %amount,
            "payment intent created"
        );
        Ok(intent)
    }

    /// Settles an order after the client reports a completed payment.
    ///
    /// The gateway is queried again rather than trusting the client. An
    /// intent still processing is reported as `PaymentIncomplete`; one that
    /// failed or was abandoned leaves the order pending.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, order_id: OrderId, intent_id: &str) -> Result<SettlementOutcome> {
        let intent = self.gateway.retrieve_intent(intent_id).await?;

        if intent.metadata.order_id != order_id {
            tracing::warn!(
                %order_id,
                intent_id,
                intent_order_id = %intent.metadata.order_id,
                "payment intent belongs to another order"
            );
            return Err(PaymentError::IntentMismatch {
                intent_id: intent.id,
                order_id,
            });
        }

        match intent.status {
            IntentStatus::Succeeded => self.settle(order_id, &intent.id).await,
            IntentStatus::Processing => Err(PaymentError::PaymentIncomplete {
                intent_id: intent.id,
                status: intent.status,
            }),
            IntentStatus::RequiresPaymentMethod | IntentStatus::Canceled => {
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(
                    %order_id,
                    intent_id = %intent.id,
                    status = %intent.status,
                    "confirmed intent has not been paid, order left pending"
                );
                Ok(SettlementOutcome::PaymentFailed {
                    order_id: Some(order_id),
                })
            }
        }
    }

    /// Authenticates and applies one webhook delivery.
    ///
    /// Only signature and decoding failures are returned as errors. Missing
    /// orders, failed payments and unknown event types are reported through
    /// the outcome so the gateway stops redelivering them.
    #[tracing::instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<SettlementOutcome> {
        let verified = signature
            .ok_or(SignatureError::MissingHeader)
            .and_then(|header| self.verifier.verify(payload, header));
        if let Err(e) = verified {
            metrics::counter!("webhooks_rejected_total").increment(1);
            tracing::warn!(error = %e, "rejected webhook");
            return Err(e.into());
        }

        let event = WebhookEvent::parse(payload)?;

        match event.classify() {
            PaymentEvent::Succeeded {
                event_id,
                intent_id,
                order_id,
            } => {
                tracing::debug!(%event_id, %intent_id, "payment succeeded event");
                self.settle_from_webhook(order_id, &intent_id).await
            }
            PaymentEvent::Failed {
                event_id,
                intent_id,
                order_id,
                code,
                message,
            } => {
                metrics::counter!("payments_failed_total").increment(1);
                tracing::warn!(
                    %event_id,
                    %intent_id,
                    order_id = ?order_id,
                    code = code.as_deref().unwrap_or("unknown"),
                    message = message.as_deref().unwrap_or(""),
                    "payment failed, order left pending"
                );
                Ok(SettlementOutcome::PaymentFailed { order_id })
            }
            PaymentEvent::Other { event_id, kind } => {
                tracing::debug!(%event_id, %kind, "ignoring webhook event");
                Ok(SettlementOutcome::Ignored { kind })
            }
        }
    }

    /// Returns the payment state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn payment_status(&self, order_id: OrderId) -> Result<PaymentStatus> {
        let order = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;
        Ok(PaymentStatus::from(&order))
    }

    /// Looks up the order a payment reference was settled against.
    #[tracing::instrument(skip(self))]
    pub async fn payment_status_by_reference(&self, reference: &str) -> Result<Option<PaymentStatus>> {
        Ok(self
            .store
            .find_by_payment_reference(reference)
            .await?
            .as_ref()
            .map(PaymentStatus::from))
    }

    async fn settle_from_webhook(
        &self,
        order_id: Option<OrderId>,
        intent_id: &str,
    ) -> Result<SettlementOutcome> {
        let Some(order_id) = order_id else {
            tracing::error!(intent_id, "payment succeeded without an order id in metadata");
            return Ok(SettlementOutcome::OrderNotFound { order_id: None });
        };

        match self.settle(order_id, intent_id).await {
            Err(PaymentError::OrderNotFound(id)) => {
                tracing::error!(order_id = %id, intent_id, "payment succeeded for unknown order");
                Ok(SettlementOutcome::OrderNotFound { order_id: Some(id) })
            }
            Err(PaymentError::NotPayable { order_id, status }) => {
                tracing::error!(
                    %order_id,
                    %status,
                    intent_id,
                    "payment succeeded for an order that cannot be paid"
                );
                Ok(SettlementOutcome::NotPayable { order_id, status })
            }
            other => other,
        }
    }

    async fn settle(&self, order_id: OrderId, intent_id: &str) -> Result<SettlementOutcome> {
        let started = Instant::now();

        let settlement = match self.store.settle_payment(order_id, intent_id).await {
            Ok(settlement) => settlement,
            Err(StoreError::OrderNotFound(id)) => return Err(PaymentError::OrderNotFound(id)),
            Err(StoreError::Transition(t)) => {
                return Err(PaymentError::NotPayable {
                    order_id,
                    status: t.current,
                });
            }
            Err(e) => return Err(e.into()),
        };

        metrics::histogram!("settlement_duration_seconds").record(started.elapsed().as_secs_f64());

        match settlement {
            Settlement::Settled { order, adjustments } => {
                metrics::counter!("payments_settled_total").increment(1);
                let clamped = adjustments.iter().filter(|a| a.was_clamped()).count();
                tracing::info!(
                    %order_id,
                    order_number = %order.order_number,
                    intent_id,
                    products = adjustments.len(),
                    clamped,
                    "payment settled"
                );
                record_transition(&order, OrderStatus::Pending);
                self.notifications
                    .emit(
                        &order,
                        Notification::for_transition(OrderStatus::Pending, order.status),
                    )
                    .await;
                Ok(SettlementOutcome::Settled {
                    order_id,
                    order_number: order.order_number,
                })
            }
            Settlement::AlreadySettled { order } => {
                metrics::counter!("payments_already_settled_total").increment(1);
                if order.payment_reference.as_deref() != Some(intent_id) {
                    tracing::warn!(
                        %order_id,
                        intent_id,
                        recorded = ?order.payment_reference,
                        "order already settled by a different payment"
                    );
                } else {
                    tracing::info!(%order_id, intent_id, "payment already settled");
                }
                Ok(SettlementOutcome::AlreadySettled {
                    order_id,
                    status: order.status,
                })
            }
        }
    }
}
