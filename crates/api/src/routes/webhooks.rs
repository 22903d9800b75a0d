//! Gateway webhook receiver.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use order_store::{Catalog, OrderStore};
use payments::{SIGNATURE_HEADER, SettlementOutcome};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(flatten)]
    pub outcome: SettlementOutcome,
}

/// POST /webhooks/payments: verify, decode and apply a gateway event.
///
/// The raw body is verified before decoding. Any outcome, including orders
/// that no longer exist, is acknowledged with 200 so the gateway stops
/// redelivering; signature and decoding failures are 400 and storage
/// failures 500, which the gateway retries.
pub async fn receive<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.settlement.handle_webhook(&body, signature).await?;
    metrics::counter!("webhooks_processed_total", "outcome" => outcome.as_str()).increment(1);
    tracing::info!(outcome = outcome.as_str(), "webhook processed");

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
