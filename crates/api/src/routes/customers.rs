//! Endpoints for a signed-in customer's own orders.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId, StoreId};
use domain::CheckoutRequest;
use order_store::{Catalog, OrderStore};
use serde::Deserialize;

use super::AppState;
use super::orders::{OrderListResponse, OrderResponse};
use crate::error::ApiError;
use crate::extract::AppJson;

#[derive(Debug, Deserialize)]
pub struct CustomerCheckoutRequest {
    pub store_id: StoreId,
    #[serde(flatten)]
    pub checkout: CheckoutRequest,
}

/// POST /customers/{customer_id}/orders: checkout as a signed-in customer.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(customer_id): Path<i64>,
    AppJson(req): AppJson<CustomerCheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .checkout_as_customer(CustomerId::new(customer_id), req.store_id, req.checkout)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /customers/{customer_id}/orders
#[tracing::instrument(skip(state))]
pub async fn list<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(customer_id): Path<i64>,
) -> Result<Json<OrderListResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let orders = state
        .orders
        .list_customer_orders(CustomerId::new(customer_id))
        .await?;
    Ok(Json(orders.into()))
}

/// GET /customers/{customer_id}/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((customer_id, id)): Path<(i64, i64)>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .get_customer_order(CustomerId::new(customer_id), OrderId::new(id))
        .await?;
    Ok(Json(order.into()))
}

/// POST /customers/{customer_id}/orders/{id}/cancel: cancel a pending order.
#[tracing::instrument(skip(state))]
pub async fn cancel<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((customer_id, id)): Path<(i64, i64)>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .cancel_customer_order(CustomerId::new(customer_id), OrderId::new(id))
        .await?;
    Ok(Json(order.into()))
}
