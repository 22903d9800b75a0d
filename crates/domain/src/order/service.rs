//! Order service exposing the store-owner and customer operations.

use common::{CustomerId, OrderId, OrderStatus, StoreId};
use order_store::{Catalog, Order, OrderFilter, OrderStats, OrderStore, OrderStoreExt};

use super::commands::{CheckoutRequest, PhoneRequirement};
use super::factory::OrderFactory;
use crate::error::{DomainError, OrderError};
use crate::notifier::{Notification, Notifications};

/// Service for managing orders.
///
/// Every lookup is scoped to the calling store or customer; an order owned
/// by someone else is reported as not found.
pub struct OrderService<S, C> {
    store: S,
    factory: OrderFactory<S, C>,
    notifications: Notifications,
}

impl<S: OrderStore + Clone, C: Catalog> OrderService<S, C> {
    /// Creates a new order service over the given store and catalog.
    pub fn new(store: S, catalog: C, notifications: Notifications) -> Self {
        let factory = OrderFactory::new(store.clone(), catalog, notifications.clone());
        Self::with_factory(store, factory, notifications)
    }

    /// Creates a service around a preconfigured factory.
    pub fn with_factory(
        store: S,
        factory: OrderFactory<S, C>,
        notifications: Notifications,
    ) -> Self {
        Self {
            store,
            factory,
            notifications,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the notification channel used for order events.
    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    // Customer-facing operations

    /// Places a guest order from the public storefront. A phone number is required.
    #[tracing::instrument(skip(self, request))]
    pub async fn checkout(
        &self,
        store_id: StoreId,
        request: CheckoutRequest,
    ) -> Result<Order, DomainError> {
        let checkout = request.validate(store_id, None, PhoneRequirement::Required)?;
        self.factory.create_order(checkout).await
    }

    /// Places an order on behalf of a signed-in customer.
    #[tracing::instrument(skip(self, request))]
    pub async fn checkout_as_customer(
        &self,
        customer_id: CustomerId,
        store_id: StoreId,
        request: CheckoutRequest,
    ) -> Result<Order, DomainError> {
        let checkout = request.validate(store_id, Some(customer_id), PhoneRequirement::Optional)?;
        self.factory.create_order(checkout).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_customer_orders(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, DomainError> {
        Ok(self.store.list_by_customer(customer_id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.store
            .find_for_customer(customer_id, order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Cancels one of the customer's own orders. Only pending orders qualify.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_customer_order(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        let order = self.get_customer_order(customer_id, order_id).await?;
        if !order.status.customer_can_cancel() {
            return Err(OrderError::CancellationNotAllowed {
                current: order.status,
            }
            .into());
        }
        self.transition(order, OrderStatus::Cancelled).await
    }

    /// Loads any order by id for the confirmation page.
    ///
    /// This lookup is not scoped to a caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_receipt(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    // Store-owner operations

    #[tracing::instrument(skip(self))]
    pub async fn list_store_orders(
        &self,
        store_id: StoreId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, DomainError> {
        Ok(self.store.list_by_store(store_id, &filter).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_store_order(
        &self,
        store_id: StoreId,
        order_id: OrderId,
    ) -> Result<Order, DomainError> {
        self.store
            .find_for_store(store_id, order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Moves a store's order to `target` if the transition table allows it.
    ///
    /// Marking an order paid here records no payment reference and leaves
    /// stock untouched; gateway payments go through settlement instead.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        store_id: StoreId,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order, DomainError> {
        let order = self.get_store_order(store_id, order_id).await?;
        self.transition(order, target).await
    }

    /// Deletes a store's order together with its items.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(
        &self,
        store_id: StoreId,
        order_id: OrderId,
    ) -> Result<(), DomainError> {
        let order = self.get_store_order(store_id, order_id).await?;
        if !self.store.delete(order.id).await? {
            return Err(DomainError::OrderNotFound(order_id));
        }
        tracing::info!(%order_id, order_number = %order.order_number, "order deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn order_stats(&self, store_id: StoreId) -> Result<OrderStats, DomainError> {
        Ok(self.store.stats(store_id).await?)
    }

    /// Applies a validated status change and notifies the customer.
    async fn transition(&self, order: Order, target: OrderStatus) -> Result<Order, DomainError> {
        let previous = order.status;
        previous.transition_to(target)?;

        let updated = self
            .store
            .update_status(order.id, previous, target, None)
            .await?;

        record_transition(&updated, previous);
        self.notifications
            .emit(&updated, Notification::for_transition(previous, target))
            .await;
        Ok(updated)
    }
}

/// Logs and counts a committed status change.
pub fn record_transition(order: &Order, previous: OrderStatus) {
    metrics::counter!(
        "order_status_transitions_total",
        "from" => previous.as_str(),
        "to" => order.status.as_str()
    )
    .increment(1);
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        from = %previous,
        to = %order.status,
        "order status changed"
    );
}
