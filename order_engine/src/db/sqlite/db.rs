use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{carts, db_url, new_pool, orders, payments, products, SqliteKeyLock};
use crate::{
    db::traits::{
        CartManagement,
        CatalogManagement,
        OrderChange,
        OrderEngineDatabase,
        OrderEngineError,
        OrderManagement,
        PaymentManagement,
        UpdateOutcome,
        VersionedRecordStore,
    },
    db_types::{Cart, NewOrder, NewPayment, NewProduct, Order, OrderItem, OrderNo, OrderStatusLog, Payment, Product},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `OE_DATABASE_URL`, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, OrderEngineError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, OrderEngineError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A lease lock that lives in this database, shared by every engine instance that uses it.
    pub fn key_lock(&self) -> SqliteKeyLock {
        SqliteKeyLock::new(self.pool.clone())
    }
}

impl OrderEngineDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), OrderEngineError> {
        self.pool.close().await;
        Ok(())
    }
}

//--------------------------------------       Products        ---------------------------------------------------------
impl VersionedRecordStore<Product> for SqliteDatabase {
    async fn fetch_record(&self, id: i64) -> Result<Option<Product>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_product(id, &mut conn).await
    }

    async fn write_if_version(&self, candidate: &Product, expected_version: i64) -> Result<Option<Product>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let written = products::write_versioned(candidate, expected_version, &mut tx).await?;
        if written.is_some() {
            tx.commit().await?;
        }
        Ok(written)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let product = products::insert_product(product, &mut tx).await?;
        tx.commit().await?;
        debug!("📦️ Product #{} '{}' added with {} in stock", product.id, product.name, product.stock);
        Ok(product)
    }
}

//--------------------------------------         Carts         ---------------------------------------------------------
impl VersionedRecordStore<Cart> for SqliteDatabase {
    async fn fetch_record(&self, id: i64) -> Result<Option<Cart>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart(id, &mut conn).await
    }

    async fn write_if_version(&self, candidate: &Cart, expected_version: i64) -> Result<Option<Cart>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let written = carts::write_versioned(candidate, expected_version, &mut tx).await?;
        if written.is_some() {
            tx.commit().await?;
        }
        Ok(written)
    }
}

impl CartManagement for SqliteDatabase {
    async fn fetch_or_create_cart(&self, user_id: &str) -> Result<Cart, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        carts::create_if_missing(user_id, &mut conn).await?;
        carts::fetch_cart_for_user(user_id, &mut conn)
            .await?
            .ok_or_else(|| OrderEngineError::DatabaseError(format!("The cart for {user_id} vanished after creation")))
    }

    async fn fetch_cart_for_user(&self, user_id: &str) -> Result<Option<Cart>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart_for_user(user_id, &mut conn).await
    }
}

//--------------------------------------        Orders         ---------------------------------------------------------
impl VersionedRecordStore<Order> for SqliteDatabase {
    async fn fetch_record(&self, id: i64) -> Result<Option<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn write_if_version(&self, candidate: &Order, expected_version: i64) -> Result<Option<Order>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let written = orders::write_versioned(candidate, expected_version, &mut tx).await?;
        if written.is_some() {
            tx.commit().await?;
        }
        Ok(written)
    }
}

impl OrderManagement for SqliteDatabase {
    /// Takes a new order, and in a single atomic transaction,
    /// * inserts the order and its items. The insert comes first so that the transaction holds the write lock from
    ///   the start,
    /// * deducts stock for every item under the product's version guard,
    /// * rewrites the cart under its version guard.
    async fn place_order(
        &self,
        order: &NewOrder,
        cart: &Cart,
        expected_cart_version: i64,
    ) -> Result<UpdateOutcome<Order>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(order, &mut tx).await?;
        for item in &order.items {
            let deducted = products::apply_stock_change(item.product_id, &mut tx, |p| p.deducted(item.quantity)).await?;
            if deducted.is_none() {
                return Ok(UpdateOutcome::Conflict);
            }
        }
        if carts::write_versioned(cart, expected_cart_version, &mut tx).await?.is_none() {
            return Ok(UpdateOutcome::Conflict);
        }
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", inserted.order_no, inserted.id);
        Ok(UpdateOutcome::Updated(inserted))
    }

    async fn fetch_order_by_no(&self, order_no: &OrderNo) -> Result<Option<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_no(order_no, &mut conn).await
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_items(order_id, &mut conn).await
    }

    async fn fetch_status_log(&self, order_id: i64) -> Result<Vec<OrderStatusLog>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_status_log(order_id, &mut conn).await
    }

    async fn apply_order_change(&self, change: &OrderChange) -> Result<UpdateOutcome<Order>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let Some(order) = orders::apply_change(change, &mut tx).await? else {
            return Ok(UpdateOutcome::Conflict);
        };
        tx.commit().await?;
        Ok(UpdateOutcome::Updated(order))
    }

    async fn fetch_unpaid_orders_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_unpaid_created_before(cutoff, &mut conn).await
    }
}

//--------------------------------------       Payments        ---------------------------------------------------------
impl VersionedRecordStore<Payment> for SqliteDatabase {
    async fn fetch_record(&self, id: i64) -> Result<Option<Payment>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn write_if_version(&self, candidate: &Payment, expected_version: i64) -> Result<Option<Payment>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let written = payments::write_versioned(candidate, expected_version, &mut tx).await?;
        if written.is_some() {
            tx.commit().await?;
        }
        Ok(written)
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::idempotent_insert(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment_by_trade_no(&self, trade_no: &str) -> Result<Option<Payment>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_trade_no(trade_no, &mut conn).await
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, OrderEngineError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments_for_order(order_id, &mut conn).await
    }

    /// Writes the payment first, then the order change, in one transaction.
    async fn settle_payment(
        &self,
        candidate: &Payment,
        expected_version: i64,
        order_change: Option<&OrderChange>,
    ) -> Result<UpdateOutcome<Payment>, OrderEngineError> {
        let mut tx = self.pool.begin().await?;
        let Some(payment) = payments::write_versioned(candidate, expected_version, &mut tx).await? else {
            return Ok(UpdateOutcome::Conflict);
        };
        if let Some(change) = order_change {
            if orders::apply_change(change, &mut tx).await?.is_none() {
                return Ok(UpdateOutcome::Conflict);
            }
        }
        tx.commit().await?;
        debug!("🗃️ Payment {} settled as {}", payment.trade_no, payment.status);
        Ok(UpdateOutcome::Updated(payment))
    }
}
