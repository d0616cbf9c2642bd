use chrono::Utc;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    checkout_api::order_objects::OrderQueryFilter,
    db_types::{NewOrder, Order, OrderNumber, OrderStatusType, PaymentSettlement},
    traits::SettlementError,
};

/// Inserts the order row using the given connection. This is not atomic on its own: callers embed it in a
/// transaction together with the line-item inserts and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementError> {
    let now = Utc::now();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                user_id,
                label,
                final_price,
                status,
                source,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(order.order_number.as_str())
    .bind(order.user_id)
    .bind(order.label.as_str())
    .bind(order.final_price)
    .bind(OrderStatusType::Ready.to_string())
    .bind(order.source.to_string())
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_number, order.id);
    Ok(order)
}

/// Returns the orders table entry for the corresponding `order_number`.
pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Hard-deletes an order. Line items and cart links cascade. Returns the number of order rows removed.
pub async fn delete_order(order_number: &OrderNumber, conn: &mut SqliteConnection) -> Result<u64, SettlementError> {
    let result =
        sqlx::query("DELETE FROM orders WHERE order_number = $1").bind(order_number.as_str()).execute(conn).await?;
    Ok(result.rows_affected())
}

/// The serialising settlement write: `Ready → Paid` together with the payment metadata, in one conditional
/// statement. Returns `None` when the order is missing or no longer `Ready`; the caller inspects the row
/// to tell an idempotent replay from a conflict.
pub async fn mark_paid(
    order_number: &OrderNumber,
    payment: &PaymentSettlement,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET status = 'Paid',
                payment_method = $1,
                payment_key = $2,
                approved_at = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE order_number = $4 AND status = 'Ready'
            RETURNING *;
        "#,
    )
    .bind(payment.method.to_string())
    .bind(payment.payment_key.as_str())
    .bind(payment.approved_at)
    .bind(order_number.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Durable compensation breadcrumb: stores the payment key with `RefundFailed` status so the charge can be
/// traced even if the process dies before the reversal call returns.
pub async fn set_refund_marker(
    order_number: &OrderNumber,
    payment_key: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders
            SET payment_key = $1, status = 'RefundFailed', updated_at = CURRENT_TIMESTAMP
            WHERE order_number = $2
            RETURNING *;
        "#,
    )
    .bind(payment_key)
    .bind(order_number.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Conditional status transition. Updates the order only if it is currently in `from`, returning the
/// updated row. `None` means the order is missing or the transition lost a race.
pub async fn transition_status(
    order_number: &OrderNumber,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementError> {
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_number = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to.to_string())
    .bind(order_number.as_str())
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_number) = query.order_number {
        where_clause.push("order_number = ");
        where_clause.push_bind_unseparated(order_number.0);
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}
