use std::collections::HashMap;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, OrderStatus, PaymentMethod, ProductId, StoreId};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use crate::{
    Catalog, NewOrder, Order, OrderFilter, OrderItem, OrderStats, OrderStore, Product, Result,
    Settlement, StockAdjustment, StoreError,
};

const ORDER_COLUMNS: &str = "id, store_id, customer_id, order_number, customer_name, \
    customer_email, customer_phone, customer_address, total_amount_cents, status, \
    payment_method, payment_reference, notes, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, unit_price_cents, quantity, total_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let item = row_to_item(&row)?;
            items.entry(item.order_id).or_default().push(item);
        }

        rows.iter()
            .map(|row| -> Result<Order> {
                let id = OrderId::new(row.try_get("id")?);
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn find_one(&self, id: OrderId) -> Result<Order> {
        self.find_by_id(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.parse()
        .map_err(|e: common::UnknownStatus| StoreError::CorruptRow(e.to_string()))
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::CorruptRow(format!("negative {column}: {value}")))
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: OrderId::new(row.try_get("order_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        total_price: Money::from_cents(row.try_get("total_price_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;

    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        store_id: StoreId::new(row.try_get("store_id")?),
        customer_id: row
            .try_get::<Option<i64>, _>("customer_id")?
            .map(CustomerId::new),
        order_number: row.try_get("order_number")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_address: row.try_get("customer_address")?,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        status: parse_status(&status)?,
        payment_method: payment_method
            .parse::<PaymentMethod>()
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        payment_reference: row.try_get("payment_reference")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        items,
    })
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get("id")?),
        store_id: StoreId::new(row.try_get("store_id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock_quantity")?,
        is_active: row.try_get("is_active")?,
    })
}

/// Locks the order row and returns its current status.
async fn lock_status(conn: &mut PgConnection, id: OrderId) -> Result<OrderStatus> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id.as_i64())
            .fetch_optional(&mut *conn)
            .await?;

    parse_status(&status.ok_or(StoreError::OrderNotFound(id))?)
}

/// Floor-at-zero decrement of one product's stock in a single statement.
async fn decrement_stock_in(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: u32,
) -> Result<Option<StockAdjustment>> {
    let row = sqlx::query(
        r#"
        UPDATE products p
        SET stock_quantity = GREATEST(p.stock_quantity - $2, 0),
            updated_at = NOW()
        FROM (SELECT id, stock_quantity FROM products WHERE id = $1 FOR UPDATE) prev
        WHERE p.id = prev.id
        RETURNING prev.stock_quantity AS previous
        "#,
    )
    .bind(product_id.as_i64())
    .bind(i64::from(quantity))
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let previous = to_u32(row.try_get("previous")?, "stock_quantity")?;
    let adjustment = StockAdjustment::apply(product_id, previous, quantity);
    if adjustment.was_clamped() {
        metrics::counter!("stock_clamped_total").increment(1);
        tracing::warn!(
            %product_id,
            requested = quantity,
            available = previous,
            "stock oversold, clamped to zero"
        );
    }
    Ok(Some(adjustment))
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, new_order: NewOrder) -> Result<Order> {
        let total_amount = new_order.total_amount();
        let order_number = new_order.order_number.clone();

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (store_id, customer_id, order_number, customer_name, customer_email,
                                customer_phone, customer_address, total_amount_cents, status,
                                payment_method, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10)
            RETURNING id
            "#,
        )
        .bind(new_order.store_id.as_i64())
        .bind(new_order.customer_id.map(|c| c.as_i64()))
        .bind(&new_order.order_number)
        .bind(&new_order.customer_name)
        .bind(&new_order.customer_email)
        .bind(&new_order.customer_phone)
        .bind(&new_order.customer_address)
        .bind(total_amount.cents())
        .bind(new_order.payment_method.as_str())
        .bind(&new_order.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_order_number")
            {
                return StoreError::DuplicateOrderNumber(order_number);
            }
            StoreError::Database(e)
        })?;

        for item in &new_order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, unit_price_cents,
                                         quantity, total_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(item.product_id.as_i64())
            .bind(&item.product_name)
            .bind(item.unit_price.cents())
            .bind(i64::from(item.quantity))
            .bind(item.total_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.find_one(OrderId::new(id)).await
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        Ok(self.load_orders(row.into_iter().collect()).await?.pop())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
        ))
        .bind(order_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(self.load_orders(row.into_iter().collect()).await?.pop())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1 LIMIT 1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(self.load_orders(row.into_iter().collect()).await?.pop())
    }

    async fn list_by_store(&self, store_id: StoreId, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE store_id = $1");
        let mut param_count = 1;

        if filter.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.date_from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query(&sql).bind(store_id.as_i64());
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(from) = filter.date_from {
            query = query.bind(from);
        }

        let rows = query.fetch_all(&self.pool).await?;
        self.load_orders(rows).await
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        self.load_orders(rows).await
    }

    async fn update_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        status: OrderStatus,
        payment_reference: Option<&str>,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let actual = lock_status(&mut *tx, id).await?;
        if actual != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual,
            });
        }
        let status = expected.transition_to(status)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                payment_reference = COALESCE($3, payment_reference),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(status.as_str())
        .bind(payment_reference)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.find_one(id).await
    }

    async fn settle_payment(&self, id: OrderId, payment_reference: &str) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;

        // The row lock serializes concurrent settlements of the same order.
        let current = lock_status(&mut *tx, id).await?;
        if current.is_settled() {
            tx.rollback().await?;
            let order = self.find_one(id).await?;
            return Ok(Settlement::AlreadySettled { order });
        }
        let paid = current.transition_to(OrderStatus::Paid)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_reference = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(paid.as_str())
        .bind(payment_reference)
        .execute(&mut *tx)
        .await?;

        // Product rows are locked in id order to avoid deadlocks between orders.
        let lines = sqlx::query(
            r#"
            SELECT product_id, SUM(quantity)::BIGINT AS quantity
            FROM order_items
            WHERE order_id = $1
            GROUP BY product_id
            ORDER BY product_id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&mut *tx)
        .await?;

        let mut adjustments = Vec::with_capacity(lines.len());
        for line in lines {
            let product_id = ProductId::new(line.try_get("product_id")?);
            let quantity: i64 = line.try_get("quantity")?;
            let quantity = u32::try_from(quantity)
                .map_err(|_| StoreError::CorruptRow(format!("quantity out of range: {quantity}")))?;

            match decrement_stock_in(&mut *tx, product_id, quantity).await? {
                Some(adjustment) => adjustments.push(adjustment),
                None => tracing::warn!(
                    order_id = %id,
                    %product_id,
                    "product no longer exists, skipping stock deduction"
                ),
            }
        }

        tx.commit().await?;

        let order = self.find_one(id).await?;
        Ok(Settlement::Settled { order, adjustments })
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self, store_id: StoreId) -> Result<OrderStats> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(total_amount_cents), 0)::BIGINT AS total
            FROM orders
            WHERE store_id = $1
            GROUP BY status
            "#,
        )
        .bind(store_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let groups = rows
            .iter()
            .map(|row| -> Result<(OrderStatus, u64, Money)> {
                let status: String = row.try_get("status")?;
                let count: i64 = row.try_get("count")?;
                let total: i64 = row.try_get("total")?;
                Ok((
                    parse_status(&status)?,
                    u64::try_from(count).unwrap_or_default(),
                    Money::from_cents(total),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderStats::from_groups(groups))
    }
}

/// PostgreSQL-backed catalog accessor over the `products` table.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a product row. Used for seeding; catalog management lives elsewhere.
    pub async fn insert_product(
        &self,
        store_id: StoreId,
        name: &str,
        price: Money,
        stock_quantity: u32,
        is_active: bool,
    ) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (store_id, name, price_cents, stock_quantity, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, store_id, name, price_cents, stock_quantity, is_active
            "#,
        )
        .bind(store_id.as_i64())
        .bind(name)
        .bind(price.cents())
        .bind(i64::from(stock_quantity))
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;

        row_to_product(&row)
    }

    /// Returns the current stock level, if the product exists.
    pub async fn stock_of(&self, product_id: ProductId) -> Result<Option<u32>> {
        let stock: Option<i32> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
                .bind(product_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;
        stock.map(|s| to_u32(s, "stock_quantity")).transpose()
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn get_active_product(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, store_id, name, price_cents, stock_quantity, is_active
            FROM products
            WHERE id = $1 AND store_id = $2 AND is_active
            "#,
        )
        .bind(product_id.as_i64())
        .bind(store_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn decrement_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<StockAdjustment>> {
        let mut conn = self.pool.acquire().await?;
        decrement_stock_in(&mut *conn, product_id, quantity).await
    }
}
