//! Records persisted and returned by the store.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, OrderStatus, PaymentMethod, ProductId, StoreId};
use serde::{Deserialize, Serialize};

/// A catalog product as seen by the order core.
///
/// The core only reads price, stock and the active flag; everything else
/// about a product belongs to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub is_active: bool,
}

/// A persisted order line. Name and price are snapshots taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub total_price: Money,
}

/// A persisted order with its items loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: String,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Sum of the line totals. Equal to `total_amount` for every stored order.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(|item| item.total_price).sum()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the order belongs to the given storefront.
    pub fn is_owned_by_store(&self, store_id: StoreId) -> bool {
        self.store_id == store_id
    }

    /// Returns true if the order was placed by the given customer.
    pub fn is_owned_by_customer(&self, customer_id: CustomerId) -> bool {
        self.customer_id == Some(customer_id)
    }
}

/// An order line about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub total_price: Money,
}

impl NewOrderItem {
    /// Snapshots a product line, computing `total_price` once.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
            total_price: unit_price.multiply(quantity),
        }
    }
}

/// An order about to be inserted together with its items.
///
/// New orders always start out `pending` without a payment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub store_id: StoreId,
    pub customer_id: Option<CustomerId>,
    pub order_number: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub customer_address: String,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// The order total: exact sum of the line totals.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(|item| item.total_price).sum()
    }
}

/// The outcome of decrementing one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub requested: u32,
    pub previous: u32,
    pub new_stock: u32,
}

impl StockAdjustment {
    /// Applies a floor-at-zero decrement to `previous`.
    pub fn apply(product_id: ProductId, previous: u32, requested: u32) -> Self {
        Self {
            product_id,
            requested,
            previous,
            new_stock: previous.saturating_sub(requested),
        }
    }

    /// True when the product did not have enough stock and was clamped to zero.
    pub fn was_clamped(&self) -> bool {
        self.requested > self.previous
    }
}
