use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CartLine, CartLineProduct},
    traits::SettlementError,
};

pub async fn insert_cart_line(
    user_id: i64,
    product_id: i64,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartLine, SettlementError> {
    let line = sqlx::query_as(
        "INSERT INTO cart_lines (user_id, product_id, quantity, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .bind(chrono::Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(line)
}

/// The user's cart lines joined with their products. Ids that do not exist, or belong to another user, are
/// simply absent from the result.
pub async fn fetch_cart_lines_with_product(
    user_id: i64,
    cart_line_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<CartLineProduct>, SettlementError> {
    if cart_line_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new(
        r#"
        SELECT cl.id AS cart_line_id, cl.product_id AS product_id, cl.quantity AS quantity,
               p.name AS name, p.price AS price, p.stock AS stock
        FROM cart_lines cl JOIN products p ON cl.product_id = p.id
        WHERE cl.user_id = "#,
    );
    builder.push_bind(user_id);
    builder.push(" AND cl.id IN (");
    let mut ids = builder.separated(", ");
    for id in cart_line_ids {
        ids.push_bind(*id);
    }
    builder.push(") ORDER BY cl.id ASC");
    let lines = builder.build_query_as::<CartLineProduct>().fetch_all(conn).await?;
    Ok(lines)
}

/// Records which cart lines an order was assembled from. Written in ascending id order alongside the order
/// insert.
pub async fn insert_order_cart_links(
    order_id: i64,
    cart_line_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    if cart_line_ids.is_empty() {
        return Ok(());
    }
    let mut sorted = cart_line_ids.to_vec();
    sorted.sort_unstable();
    let mut builder = QueryBuilder::new("INSERT INTO order_cart_lines (order_id, cart_line_id) ");
    builder.push_values(sorted.iter(), |mut row, cart_line_id| {
        row.push_bind(order_id).push_bind(*cart_line_id);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

/// Deletes the cart lines linked to the order, restricted to the owning user. Returns the number of cart
/// lines removed.
pub async fn delete_cart_lines_for_order(
    order_id: i64,
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, SettlementError> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_lines
        WHERE user_id = $1
          AND id IN (SELECT cart_line_id FROM order_cart_lines WHERE order_id = $2)
        "#,
    )
    .bind(user_id)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
