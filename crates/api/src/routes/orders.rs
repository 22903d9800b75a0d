//! Storefront checkout, store-owner administration and receipt endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CustomerId, OrderId, OrderStatus, PaymentMethod, ProductId, StoreId};
use domain::CheckoutRequest;
use order_store::{Catalog, Order, OrderFilter, OrderItem, OrderStats, OrderStore};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;
use crate::extract::AppJson;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub date_from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_number: String,
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub total_amount: String,
    pub total_cents: i64,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            total_price_cents: item.total_price.cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            id: order.id,
            order_number: order.order_number,
            store_id: order.store_id,
            customer_id: order.customer_id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            customer_address: order.customer_address,
            status: order.status,
            payment_method: order.payment_method,
            payment_reference: order.payment_reference,
            notes: order.notes,
            total_amount: order.total_amount.to_decimal_string(),
            total_cents: order.total_amount.cents(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: usize,
}

impl From<Vec<Order>> for OrderListResponse {
    fn from(orders: Vec<Order>) -> Self {
        Self {
            total: orders.len(),
            orders: orders.into_iter().map(OrderResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /stores/{store_id}/checkout: place a guest order from the storefront.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(store_id): Path<i64>,
    AppJson(req): AppJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .checkout(StoreId::new(store_id), req)
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /stores/{store_id}/orders: list a store's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(store_id): Path<i64>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let mut filter = OrderFilter::new();
    if let Some(status) = query.status {
        filter = filter.status(status);
    }
    if let Some(raw) = query.date_from.as_deref() {
        filter = filter.date_from(parse_date_from(raw)?);
    }

    let orders = state
        .orders
        .list_store_orders(StoreId::new(store_id), filter)
        .await?;
    Ok(Json(orders.into()))
}

/// GET /stores/{store_id}/orders/stats: per-status counts and confirmed revenue.
#[tracing::instrument(skip(state))]
pub async fn stats<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(store_id): Path<i64>,
) -> Result<Json<OrderStats>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let stats = state.orders.order_stats(StoreId::new(store_id)).await?;
    Ok(Json(stats))
}

/// GET /stores/{store_id}/orders/{id}: fetch one of the store's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((store_id, id)): Path<(i64, i64)>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .get_store_order(StoreId::new(store_id), OrderId::new(id))
        .await?;
    Ok(Json(order.into()))
}

/// PATCH /stores/{store_id}/orders/{id}/status: move an order along the lifecycle.
#[tracing::instrument(skip(state))]
pub async fn update_status<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((store_id, id)): Path<(i64, i64)>,
    AppJson(req): AppJson<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state
        .orders
        .update_status(StoreId::new(store_id), OrderId::new(id), req.status)
        .await?;
    Ok(Json(order.into()))
}

/// DELETE /stores/{store_id}/orders/{id}: delete an order and its items.
#[tracing::instrument(skip(state))]
pub async fn delete<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path((store_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    state
        .orders
        .delete_order(StoreId::new(store_id), OrderId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /orders/{id}/receipt: order confirmation view.
///
/// Not scoped to a store or customer: anyone holding the id can read it.
#[tracing::instrument(skip(state))]
pub async fn receipt<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let order = state.orders.get_receipt(OrderId::new(id)).await?;
    Ok(Json(order.into()))
}

/// Accepts an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
fn parse_date_from(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid date_from: {raw}")))
}
