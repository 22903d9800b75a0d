use async_trait::async_trait;
use common::{ProductId, StoreId};

use crate::{Product, Result, StockAdjustment};

/// Read access to products and the atomic stock decrement.
///
/// The catalog itself is owned elsewhere; the order core only looks up
/// active products and removes stock.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the product if it exists, belongs to `store_id` and is active.
    async fn get_active_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<Product>>;

    /// Removes `quantity` units from stock, flooring at zero.
    ///
    /// Returns `None` if the product no longer exists.
    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<StockAdjustment>>;
}
