use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, OrderStatus, ProductId, StoreId};
use tokio::sync::RwLock;

use crate::{
    Catalog, NewOrder, Order, OrderFilter, OrderItem, OrderStats, OrderStore, Product, Result,
    Settlement, StockAdjustment, StoreError,
};

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, Product>,
    next_id: i64,
}

impl CatalogState {
    fn decrement(&mut self, product_id: ProductId, quantity: u32) -> Option<StockAdjustment> {
        let product = self.products.get_mut(&product_id)?;
        let adjustment = StockAdjustment::apply(product_id, product.stock_quantity, quantity);
        product.stock_quantity = adjustment.new_stock;
        if adjustment.was_clamped() {
            metrics::counter!("stock_clamped_total").increment(1);
            tracing::warn!(
                %product_id,
                requested = quantity,
                available = adjustment.previous,
                "stock oversold, clamped to zero"
            );
        }
        Some(adjustment)
    }
}

/// In-memory catalog for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product, assigning it the next id.
    pub async fn add_product(
        &self,
        store_id: StoreId,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
    ) -> Product {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let product = Product {
            id: ProductId::new(state.next_id),
            store_id,
            name: name.into(),
            price,
            stock_quantity,
            is_active: true,
        };
        state.products.insert(product.id, product.clone());
        product
    }

    /// Flips a product's active flag.
    pub async fn set_active(&self, product_id: ProductId, active: bool) {
        if let Some(product) = self.state.write().await.products.get_mut(&product_id) {
            product.is_active = active;
        }
    }

    /// Overwrites a product's stock level.
    pub async fn set_stock(&self, product_id: ProductId, stock_quantity: u32) {
        if let Some(product) = self.state.write().await.products.get_mut(&product_id) {
            product.stock_quantity = stock_quantity;
        }
    }

    /// Removes a product entirely.
    pub async fn remove_product(&self, product_id: ProductId) {
        self.state.write().await.products.remove(&product_id);
    }

    /// Returns the current stock level, if the product exists.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock_quantity)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_active_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state
            .products
            .get(&product_id)
            .filter(|p| p.store_id == store_id && p.is_active)
            .cloned())
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<StockAdjustment>> {
        Ok(self.state.write().await.decrement(product_id, quantity))
    }
}

#[derive(Debug, Default)]
struct OrderState {
    orders: BTreeMap<OrderId, Order>,
    next_order_id: i64,
    next_item_id: i64,
}

/// In-memory order store for tests and local runs.
///
/// Shares its catalog so that settlement can deduct stock while holding the
/// order lock. Locks are always taken orders-then-catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
    catalog: InMemoryCatalog,
}

impl InMemoryOrderStore {
    /// Creates an empty store with its own empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store deducting stock from `catalog`.
    pub fn with_catalog(catalog: InMemoryCatalog) -> Self {
        Self {
            state: Arc::default(),
            catalog,
        }
    }

    /// Returns the catalog this store settles against.
    pub fn catalog(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let mut state = self.state.write().await;

        if state
            .orders
            .values()
            .any(|o| o.order_number == new_order.order_number)
        {
            return Err(StoreError::DuplicateOrderNumber(new_order.order_number));
        }

        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let total_amount = new_order.total_amount();

        let mut items = Vec::with_capacity(new_order.items.len());
        for item in new_order.items {
            state.next_item_id += 1;
            items.push(OrderItem {
                id: state.next_item_id,
                order_id: id,
                product_id: item.product_id,
                product_name: item.product_name,
                unit_price: item.unit_price,
                quantity: item.quantity,
                total_price: item.total_price,
            });
        }

        let now = Utc::now();
        let order = Order {
            id,
            store_id: new_order.store_id,
            customer_id: new_order.customer_id,
            order_number: new_order.order_number,
            customer_name: new_order.customer_name,
            customer_email: new_order.customer_email,
            customer_phone: new_order.customer_phone,
            customer_address: new_order.customer_address,
            total_amount,
            status: OrderStatus::Pending,
            payment_method: new_order.payment_method,
            payment_reference: None,
            notes: new_order.notes,
            created_at: now,
            updated_at: now,
            items,
        };
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn list_by_store(&self, store_id: StoreId, filter: &OrderFilter) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.store_id == store_id && filter.matches(o))
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let orders = state
            .orders
            .values()
            .filter(|o| o.customer_id == Some(customer_id))
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }

        order.status = expected.transition_to(status)?;
        if let Some(reference) = payment_reference {
            order.payment_reference = Some(reference.to_string());
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn settle_payment(&self, id: OrderId, payment_reference: &str) -> Result<Settlement> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if order.status.is_settled() {
            return Ok(Settlement::AlreadySettled {
                order: order.clone(),
            });
        }

        // Validate before touching stock so a rejected settlement changes nothing.
        let paid = order.status.transition_to(OrderStatus::Paid)?;

        let mut catalog = self.catalog.state.write().await;
        let adjustments = order
            .items
            .iter()
            .filter_map(|item| {
                let adjustment = catalog.decrement(item.product_id, item.quantity);
                if adjustment.is_none() {
                    tracing::warn!(
                        order_id = %id,
                        product_id = %item.product_id,
                        "product no longer exists, skipping stock deduction"
                    );
                }
                adjustment
            })
            .collect();

        order.status = paid;
        order.payment_reference = Some(payment_reference.to_string());
        order.updated_at = Utc::now();

        Ok(Settlement::Settled {
            order: order.clone(),
            adjustments,
        })
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        Ok(self.state.write().await.orders.remove(&id).is_some())
    }

    async fn stats(&self, store_id: StoreId) -> Result<OrderStats> {
        let state = self.state.read().await;
        let groups = state
            .orders
            .values()
            .filter(|o| o.store_id == store_id)
            .map(|o| (o.status, 1, o.total_amount));
        Ok(OrderStats::from_groups(groups))
    }
}

#[cfg(test)]
mod tests {
    use common::PaymentMethod;

    use super::*;
    use crate::{NewOrderItem, OrderStoreExt};

    async fn seeded() -> (InMemoryOrderStore, Product, Product) {
        let store = InMemoryOrderStore::new();
        let mug = store
            .catalog()
            .add_product(StoreId::new(1), "Mug", Money::from_major(50), 10)
            .await;
        let tote = store
            .catalog()
            .add_product(StoreId::new(1), "Tote", Money::from_major(20), 5)
            .await;
        (store, mug, tote)
    }

    fn new_order(number: &str, mug: &Product, tote: &Product) -> NewOrder {
        NewOrder {
            store_id: StoreId::new(1),
            customer_id: Some(CustomerId::new(9)),
            order_number: number.to_string(),
            customer_name: "Aina".to_string(),
            customer_email: "aina@example.com".to_string(),
            customer_phone: Some("0123456789".to_string()),
            customer_address: "1 Jalan Ampang".to_string(),
            payment_method: PaymentMethod::Stripe,
            notes: None,
            items: vec![
                NewOrderItem::new(mug.id, &mug.name, mug.price, 1),
                NewOrderItem::new(tote.id, &tote.name, tote.price, 2),
            ],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids_and_total() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        assert_eq!(order.id, OrderId::new(1));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_major(90));
        assert_eq!(order.items_total(), order.total_amount);
        assert!(order.items.iter().all(|i| i.order_id == order.id));
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let (store, mug, tote) = seeded().await;
        store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        let err = store
            .create(new_order("ORD-A", &mug, &tote))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrderNumber(n) if n == "ORD-A"));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_settle_deducts_stock_once() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        let first = store.settle_payment(order.id, "pi_1").await.unwrap();
        assert!(first.is_fresh());
        assert_eq!(first.order().status, OrderStatus::Paid);
        assert_eq!(first.order().payment_reference.as_deref(), Some("pi_1"));

        let second = store.settle_payment(order.id, "pi_1").await.unwrap();
        assert!(!second.is_fresh());

        assert_eq!(store.catalog().stock_of(mug.id).await, Some(9));
        assert_eq!(store.catalog().stock_of(tote.id).await, Some(3));
    }

    #[tokio::test]
    async fn test_settle_clamps_stock_at_zero() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();
        store.catalog().set_stock(tote.id, 1).await;

        let settlement = store.settle_payment(order.id, "pi_1").await.unwrap();
        let Settlement::Settled { adjustments, .. } = settlement else {
            panic!("expected fresh settlement");
        };
        let tote_adj = adjustments.iter().find(|a| a.product_id == tote.id).unwrap();
        assert!(tote_adj.was_clamped());
        assert_eq!(store.catalog().stock_of(tote.id).await, Some(0));
    }

    #[tokio::test]
    async fn test_settle_cancelled_order_changes_nothing() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();
        store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let err = store.settle_payment(order.id, "pi_1").await.unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(store.catalog().stock_of(mug.id).await, Some(10));
        let reloaded = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.payment_reference, None);
    }

    #[tokio::test]
    async fn test_update_status_detects_stale_expectation() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        let err = store
            .update_status(order.id, OrderStatus::Paid, OrderStatus::Shipped, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict {
                actual: OrderStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tenant_scoped_lookups() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        assert!(
            store
                .find_for_store(StoreId::new(1), order.id)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_for_store(StoreId::new(2), order.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .find_for_customer(CustomerId::new(10), order.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_delete_removes_order() {
        let (store, mug, tote) = seeded().await;
        let order = store.create(new_order("ORD-A", &mug, &tote)).await.unwrap();

        assert!(store.delete(order.id).await.unwrap());
        assert!(!store.delete(order.id).await.unwrap());
        assert!(store.find_by_id(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_hides_inactive_and_foreign_products() {
        let (store, mug, _) = seeded().await;
        let catalog = store.catalog();

        assert!(
            catalog
                .get_active_product(StoreId::new(2), mug.id)
                .await
                .unwrap()
                .is_none()
        );
        catalog.set_active(mug.id, false).await;
        assert!(
            catalog
                .get_active_product(StoreId::new(1), mug.id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
