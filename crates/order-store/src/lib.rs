//! Persistence for orders and order items, plus the catalog accessor the
//! order core consumes.
//!
//! Two backends implement the same traits: an in-memory one for tests and
//! local runs, and PostgreSQL via sqlx. Both treat "create order with items"
//! and "settle payment" as single atomic units of work.

pub mod catalog;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use catalog::Catalog;
pub use error::{Result, StoreError};
pub use memory::{InMemoryCatalog, InMemoryOrderStore};
pub use model::{NewOrder, NewOrderItem, Order, OrderItem, Product, StockAdjustment};
pub use postgres::{PostgresCatalog, PostgresOrderStore};
pub use query::{OrderFilter, OrderStats};
pub use store::{OrderStore, OrderStoreExt, Settlement};
