//! HTTP API for the Miles order core.
//!
//! Exposes storefront checkout, customer and store-owner order management,
//! payment intents and the gateway webhook, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{LoggingNotifier, Notifications, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{Catalog, OrderStore};
use payments::{InMemoryPaymentGateway, SettlementProcessor, SignatureError, WebhookVerifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    use routes::{customers, orders, webhooks};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Storefront
        .route("/stores/{store_id}/checkout", post(orders::checkout::<S, C>))
        .route("/orders/{id}/receipt", get(orders::receipt::<S, C>))
        // Store owner
        .route("/stores/{store_id}/orders", get(orders::list::<S, C>))
        .route("/stores/{store_id}/orders/stats", get(orders::stats::<S, C>))
        .route(
            "/stores/{store_id}/orders/{id}",
            get(orders::get::<S, C>).delete(orders::delete::<S, C>),
        )
        .route(
            "/stores/{store_id}/orders/{id}/status",
            patch(orders::update_status::<S, C>),
        )
        // Signed-in customer
        .route(
            "/customers/{customer_id}/orders",
            get(customers::list::<S, C>).post(customers::checkout::<S, C>),
        )
        .route(
            "/customers/{customer_id}/orders/{id}",
            get(customers::get::<S, C>),
        )
        .route(
            "/customers/{customer_id}/orders/{id}/cancel",
            post(customers::cancel::<S, C>),
        )
        // Payments
        .route("/payments/intents", post(routes::payments::create_intent::<S, C>))
        .route("/payments/confirm", post(routes::payments::confirm::<S, C>))
        .route(
            "/payments/orders/{id}/status",
            get(routes::payments::order_status::<S, C>),
        )
        .route(
            "/payments/references/{reference}",
            get(routes::payments::by_reference::<S, C>),
        )
        .route("/webhooks/payments", post(webhooks::receive::<S, C>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the order service and settlement processor over one store.
///
/// Fails only when the configured webhook secret is empty.
pub fn create_state<S, C>(
    store: S,
    catalog: C,
    gateway: InMemoryPaymentGateway,
    notifications: Notifications,
    config: &Config,
) -> Result<Arc<AppState<S, C>>, SignatureError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let verifier = WebhookVerifier::new(&config.webhook_secret, config.webhook_tolerance_secs)?;
    let settlement = SettlementProcessor::new(
        store.clone(),
        gateway,
        verifier,
        notifications.clone(),
        config.settlement(),
    );
    let orders = OrderService::new(store, catalog, notifications);

    Ok(Arc::new(AppState { orders, settlement }))
}

/// Creates state with background log-only notifications and an in-memory gateway.
pub fn create_default_state<S, C>(
    store: S,
    catalog: C,
    config: &Config,
) -> Result<Arc<AppState<S, C>>, SignatureError>
where
    S: OrderStore + Clone + 'static,
    C: Catalog + 'static,
{
    let notifications = Notifications::background(Arc::new(LoggingNotifier));
    create_state(
        store,
        catalog,
        InMemoryPaymentGateway::new(),
        notifications,
        config,
    )
}
