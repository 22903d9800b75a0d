//! Turns validated checkouts into persisted orders.

use std::collections::HashMap;
use std::sync::Arc;

use common::{Money, ProductId};
use order_store::{Catalog, NewOrder, NewOrderItem, Order, OrderStore, OrderStoreExt, StoreError};

use super::commands::Checkout;
use super::number::generate_order_number;
use crate::error::{DomainError, FieldError, OrderError};
use crate::notifier::{Notification, Notifications};

/// How many order numbers are tried before giving up.
pub const MAX_NUMBER_ATTEMPTS: usize = 16;

type NumberSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Prices a checkout against the catalog and persists the resulting order.
///
/// Stock is only checked here, never reserved; deduction happens when the
/// order is paid.
pub struct OrderFactory<S, C> {
    store: S,
    catalog: C,
    notifications: Notifications,
    numbers: NumberSource,
}

impl<S: OrderStore, C: Catalog> OrderFactory<S, C> {
    /// Creates a factory issuing random `ORD-` numbers.
    pub fn new(store: S, catalog: C, notifications: Notifications) -> Self {
        Self {
            store,
            catalog,
            notifications,
            numbers: Arc::new(generate_order_number),
        }
    }

    /// Replaces the order number generator.
    pub fn with_number_source(
        mut self,
        numbers: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.numbers = Arc::new(numbers);
        self
    }

    /// Returns a reference to the catalog.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Validates stock, assigns a unique number and stores the order.
    ///
    /// Nothing is written unless every line refers to an active product of
    /// the checkout's store with enough stock.
    #[tracing::instrument(skip(self, checkout), fields(store_id = %checkout.store_id))]
    pub async fn create_order(&self, checkout: Checkout) -> Result<Order, DomainError> {
        let items = self.price_lines(&checkout).await?;

        let template = NewOrder {
            store_id: checkout.store_id,
            customer_id: checkout.customer_id,
            order_number: String::new(),
            customer_name: checkout.contact.name,
            customer_email: checkout.contact.email,
            customer_phone: checkout.contact.phone,
            customer_address: checkout.contact.address,
            payment_method: checkout.payment_method,
            notes: checkout.notes,
            items,
        };

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let order_number = (self.numbers)();
            if self.store.order_number_exists(&order_number).await? {
                tracing::debug!(%order_number, attempt, "order number taken, retrying");
                continue;
            }

            let new_order = NewOrder {
                order_number,
                ..template.clone()
            };

            match self.store.create(new_order).await {
                Ok(order) => {
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(
                        order_id = %order.id,
                        order_number = %order.order_number,
                        total = %order.total_amount,
                        items = order.item_count(),
                        "order created"
                    );
                    self.notifications
                        .emit(&order, Notification::Confirmation)
                        .await;
                    return Ok(order);
                }
                // Lost a race with a concurrent checkout for the same number.
                Err(StoreError::DuplicateOrderNumber(order_number)) => {
                    tracing::debug!(%order_number, attempt, "order number collided on insert");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = MAX_NUMBER_ATTEMPTS,
            "could not find a free order number"
        );
        Err(OrderError::OrderNumberExhausted {
            attempts: MAX_NUMBER_ATTEMPTS,
        }
        .into())
    }

    /// Resolves each line to a priced item, checking availability.
    ///
    /// Quantities of repeated products are summed before the stock check.
    /// A line whose price would overflow the order total is a field error.
    async fn price_lines(&self, checkout: &Checkout) -> Result<Vec<NewOrderItem>, DomainError> {
        let mut requested: HashMap<ProductId, u32> = HashMap::new();
        let mut items = Vec::with_capacity(checkout.lines.len());
        let mut order_total = Money::zero();

        for (index, line) in checkout.lines.iter().enumerate() {
            let product = self
                .catalog
                .get_active_product(checkout.store_id, line.product_id)
                .await?
                .ok_or(OrderError::ProductUnavailable {
                    product_id: line.product_id,
                })?;

            let total = requested.entry(product.id).or_default();
            *total = total.saturating_add(line.quantity);
            if *total > product.stock_quantity {
                return Err(OrderError::InsufficientStock {
                    product_id: product.id,
                    product_name: product.name,
                    available: product.stock_quantity,
                    requested: *total,
                }
                .into());
            }

            order_total = product
                .price
                .checked_multiply(line.quantity)
                .and_then(|line_total| order_total.checked_add(line_total))
                .ok_or_else(|| OrderError::ValidationFailed {
                    fields: vec![FieldError::new(
                        format!("items.{index}.quantity"),
                        "order total exceeds the largest chargeable amount",
                    )],
                })?;

            items.push(NewOrderItem::new(
                product.id,
                product.name,
                product.price,
                line.quantity,
            ));
        }

        Ok(items)
    }
}
