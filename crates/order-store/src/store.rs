use async_trait::async_trait;
use common::{CustomerId, OrderId, OrderStatus, StoreId};

use crate::{NewOrder, Order, OrderFilter, OrderStats, Result, StockAdjustment};

/// The result of applying a confirmed payment to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The order moved from `pending` to `paid` and stock was deducted.
    Settled {
        order: Order,
        adjustments: Vec<StockAdjustment>,
    },

    /// The order was already paid (or further along); nothing was changed.
    AlreadySettled { order: Order },
}

impl Settlement {
    pub fn order(&self) -> &Order {
        match self {
            Settlement::Settled { order, .. } | Settlement::AlreadySettled { order } => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Settlement::Settled { order, .. } | Settlement::AlreadySettled { order } => order,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Settlement::Settled { .. })
    }
}

/// Durable storage for orders and their items.
///
/// All implementations must be thread-safe (Send + Sync). Tenant scoping is
/// applied by callers on top of the id lookups here; listing operations take
/// the owning store or customer id directly.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts an order and all of its items atomically.
    ///
    /// The order starts `pending` with `total_amount` equal to the sum of the
    /// item totals. Fails with `DuplicateOrderNumber` if the number is taken.
    async fn create(&self, order: NewOrder) -> Result<Order>;

    /// Loads an order with its items.
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    /// Loads an order by its human-readable number.
    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>>;

    /// Loads the order a confirmed payment reference was recorded against.
    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>>;

    /// Lists a store's orders, newest first.
    async fn list_by_store(&self, store_id: StoreId, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Lists a customer's orders, newest first.
    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Moves an order from `expected` to `status`.
    ///
    /// The write only happens if the order is still in `expected`, otherwise
    /// `StatusConflict` is returned. The transition itself must be legal.
    /// `payment_reference`, when given, is recorded alongside.
    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<Order>;

    /// Marks a pending order paid and deducts stock for every item, as one unit.
    ///
    /// Orders already paid, shipped or completed are returned untouched as
    /// `AlreadySettled`, so repeated calls deduct stock exactly once. Stock is
    /// clamped at zero rather than rejected.
    async fn settle_payment(&self, id: OrderId, payment_reference: &str) -> Result<Settlement>;

    /// Deletes an order and its items. Returns false if it did not exist.
    async fn delete(&self, id: OrderId) -> Result<bool>;

    /// Counts a store's orders per status and sums confirmed revenue.
    async fn stats(&self, store_id: StoreId) -> Result<OrderStats>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Checks whether an order number has already been issued.
    async fn order_number_exists(&self, order_number: &str) -> Result<bool> {
        Ok(self.find_by_order_number(order_number).await?.is_some())
    }

    /// Loads an order only if it belongs to the given store.
    async fn find_for_store(&self, store_id: StoreId, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .find_by_id(id)
            .await?
            .filter(|order| order.is_owned_by_store(store_id)))
    }

    /// Loads an order only if it was placed by the given customer.
    async fn find_for_customer(
        &self,
        customer_id: CustomerId,
        id: OrderId,
    ) -> Result<Option<Order>> {
        Ok(self
            .find_by_id(id)
            .await?
            .filter(|order| order.is_owned_by_customer(customer_id)))
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
