//! `SqliteDatabase` is the concrete SQLite backend of the checkout engine.
//!
//! It implements all the backend traits defined in the [`crate::traits`] module. Every trait method opens
//! either a pooled connection or a transaction and delegates to the plain functions in [`super::db`]; the
//! transaction boundaries here are exactly the critical sections described by those traits.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{carts, db_url, new_pool, order_lines, orders, products};
use crate::{
    checkout_api::{
        catalog_objects::{CatalogEntry, FeaturedItem},
        order_objects::OrderQueryFilter,
    },
    db_types::{
        CartLineProduct,
        NewOrder,
        NewProduct,
        Order,
        OrderLine,
        OrderNumber,
        OrderStatusType,
        PaymentSettlement,
        Product,
    },
    traits::{
        CatalogDatabase,
        CatalogError,
        InventoryManagement,
        OrderManagement,
        SettlementDatabase,
        SettlementError,
        SettlementOutcome,
        StockDirection,
    },
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
    /// Connects to the database given by the `COMMERCE_DATABASE_URL` environment variable, or the default
    /// store path.
    pub async fn new(max_connections: u32) -> Result<Self, SettlementError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let inserted = orders::insert_order(&order, &mut tx).await?;
        order_lines::insert_order_lines(inserted.id, &order.lines, &mut tx).await?;
        carts::insert_order_cart_links(inserted.id, &order.cart_line_ids, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] saved with {} line items", inserted.order_number, order.lines.len());
        Ok(inserted)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let lines = order_lines::fetch_order_lines(order_id, &mut conn).await?;
        Ok(lines)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_cart_lines(
        &self,
        user_id: i64,
        cart_line_ids: &[i64],
    ) -> Result<Vec<CartLineProduct>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        carts::fetch_cart_lines_with_product(user_id, cart_line_ids, &mut conn).await
    }

    async fn delete_order(&self, order_number: &OrderNumber) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let removed = orders::delete_order(order_number, &mut conn).await?;
        if removed == 0 {
            warn!("🗃️ Abandoned order [{order_number}] was already gone");
        } else {
            debug!("🗃️ Abandoned order [{order_number}] deleted");
        }
        Ok(())
    }

    /// The settlement critical section. The conditional `Ready → Paid` update is the first statement of the
    /// transaction, so concurrent settlements of the same order serialise on it; the loser sees the
    /// post-transition row and is classified without mutating anything.
    async fn settle_order(
        &self,
        order_number: &OrderNumber,
        payment: &PaymentSettlement,
    ) -> Result<SettlementOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match orders::mark_paid(order_number, payment, &mut tx).await? {
            Some(order) => {
                let lines = order_lines::fetch_order_lines(order.id, &mut tx).await?;
                let quantities = order_lines::quantities_by_product(&lines);
                let requested = quantities.len() as u64;
                let updated = products::adjust_stock(&quantities, StockDirection::Decrease, &mut tx).await?;
                if updated != requested {
                    // at least one product cannot cover its quantity; the whole settlement is undone
                    tx.rollback().await?;
                    warn!(
                        "🗃️ Stock decrement for order [{order_number}] covered {updated}/{requested} products. \
                         Rolled back"
                    );
                    return Ok(SettlementOutcome::OutOfStock);
                }
                tx.commit().await?;
                debug!("🗃️ Order [{order_number}] marked Paid and stock reserved for {requested} products");
                Ok(SettlementOutcome::Settled(order))
            },
            None => {
                let order = orders::fetch_order_by_number(order_number, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::OrderNotFound(order_number.clone()))?;
                // idempotency re-check under the serialising write
                if order.status == OrderStatusType::Paid
                    && order.payment_key.as_deref() == Some(payment.payment_key.as_str())
                {
                    Ok(SettlementOutcome::AlreadyPaid(order))
                } else {
                    Ok(SettlementOutcome::Conflict(order))
                }
            },
        }
    }

    async fn record_refund_marker(
        &self,
        order_number: &OrderNumber,
        payment_key: &str,
    ) -> Result<(), SettlementError> {
        // own transaction: this breadcrumb must survive whatever happens to the reversal call
        let mut tx = self.pool.begin().await?;
        let order = orders::set_refund_marker(order_number, payment_key, &mut tx).await?;
        if order.is_none() {
            return Err(SettlementError::OrderNotFound(order_number.clone()));
        }
        tx.commit().await?;
        debug!("🗃️ Refund marker recorded for order [{order_number}] with payment key {payment_key}");
        Ok(())
    }

    async fn complete_compensation(&self, order_number: &OrderNumber) -> Result<Order, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            orders::transition_status(order_number, OrderStatusType::RefundFailed, OrderStatusType::Cancelled, &mut conn)
                .await?;
        order.ok_or_else(|| SettlementError::Conflict(order_number.clone()))
    }

    async fn cancel_unpaid_order(&self, order_number: &OrderNumber) -> Result<Order, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            orders::transition_status(order_number, OrderStatusType::Ready, OrderStatusType::Cancelled, &mut conn)
                .await?;
        order.ok_or_else(|| SettlementError::Conflict(order_number.clone()))
    }

    async fn begin_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            orders::transition_status(order_number, OrderStatusType::Paid, OrderStatusType::CancelRequested, &mut conn)
                .await?;
        order.ok_or_else(|| SettlementError::Conflict(order_number.clone()))
    }

    /// Status flip and stock restore in one transaction: a cancellation either fully happens or not at all.
    async fn complete_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::transition_status(
            order_number,
            OrderStatusType::CancelRequested,
            OrderStatusType::Cancelled,
            &mut tx,
        )
        .await?
        .ok_or_else(|| SettlementError::Conflict(order_number.clone()))?;
        let lines = order_lines::fetch_order_lines(order.id, &mut tx).await?;
        let quantities = order_lines::quantities_by_product(&lines);
        products::adjust_stock(&quantities, StockDirection::Increase, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_number}] cancelled and stock restored for {} products", quantities.len());
        Ok(order)
    }

    async fn revert_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order =
            orders::transition_status(order_number, OrderStatusType::CancelRequested, OrderStatusType::Paid, &mut conn)
                .await?;
        order.ok_or_else(|| SettlementError::Conflict(order_number.clone()))
    }

    async fn clear_cart_lines_for_order(&self, order: &Order) -> Result<u64, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        carts::delete_cart_lines_for_order(order.id, order.user_id, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}

impl InventoryManagement for SqliteDatabase {
    async fn conditional_adjust_stock(
        &self,
        qty_by_product: &std::collections::BTreeMap<i64, i64>,
        direction: StockDirection,
    ) -> Result<u64, SettlementError> {
        // a single set-based statement; atomic without an explicit transaction
        let mut conn = self.pool.acquire().await?;
        let updated = products::adjust_stock(qty_by_product, direction, &mut conn).await?;
        trace!("🗃️ Stock {direction} touched {updated}/{} products", qty_by_product.len());
        Ok(updated)
    }
}

impl OrderManagement for SqliteDatabase {
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl CatalogDatabase for SqliteDatabase {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        let mut conn = self.pool.acquire().await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
        products::insert_product(&product, &mut conn).await
    }

    async fn featured_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut conn = self.pool.acquire().await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
        products::featured_entries(&mut conn).await
    }

    async fn popular_entries(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CatalogEntry>, CatalogError> {
        let mut conn = self.pool.acquire().await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
        products::popular_entries(since, limit, &mut conn).await
    }

    async fn update_featured(&self, items: &[FeaturedItem]) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
        products::update_featured(items, &mut tx).await?;
        tx.commit().await.map_err(|e| CatalogError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}
