//! Payment intent, confirmation and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use order_store::{Catalog, OrderStore};
use payments::{IntentStatus, PaymentIntent, PaymentStatus, SettlementOutcome};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;
use crate::extract::AppJson;

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub order_id: OrderId,
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub amount_cents: i64,
    pub currency: String,
    pub status: IntentStatus,
}

impl From<PaymentIntent> for IntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
            amount_cents: intent.amount.cents(),
            currency: intent.currency,
            status: intent.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub paid: bool,
    #[serde(flatten)]
    pub outcome: SettlementOutcome,
}

/// POST /payments/intents: open a gateway intent for a pending order.
#[tracing::instrument(skip(state))]
pub async fn create_intent<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    AppJson(req): AppJson<CreateIntentRequest>,
) -> Result<(StatusCode, Json<IntentResponse>), ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let intent = state.settlement.create_intent(req.order_id).await?;
    Ok((StatusCode::CREATED, Json(intent.into())))
}

/// POST /payments/confirm: settle after the client completes payment.
#[tracing::instrument(skip(state))]
pub async fn confirm<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    AppJson(req): AppJson<ConfirmPaymentRequest>,
) -> Result<Json<ConfirmResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let outcome = state
        .settlement
        .confirm(req.order_id, &req.payment_intent_id)
        .await?;
    Ok(Json(ConfirmResponse {
        paid: outcome.is_paid(),
        outcome,
    }))
}

/// GET /payments/orders/{id}/status
#[tracing::instrument(skip(state))]
pub async fn order_status<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<PaymentStatus>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let status = state.settlement.payment_status(OrderId::new(id)).await?;
    Ok(Json(status))
}

/// GET /payments/references/{reference}: find the order a payment settled.
#[tracing::instrument(skip(state))]
pub async fn by_reference<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentStatus>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    state
        .settlement
        .payment_status_by_reference(&reference)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No order paid with reference {reference}")))
}

