use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    checkout_api::catalog_objects::{CatalogEntry, FeaturedItem},
    db_types::{NewProduct, Product},
    traits::{CatalogError, SettlementError, StockDirection},
};

pub async fn insert_product(product: &NewProduct, conn: &mut SqliteConnection) -> Result<Product, CatalogError> {
    let now = Utc::now();
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (name, price, stock, main_image, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(product.name.as_str())
    .bind(product.price)
    .bind(product.stock)
    .bind(product.main_image.as_deref())
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

/// Adjusts the stock of every product in `qty_by_product` with a single set-based statement:
///
/// ```sql
/// UPDATE products SET stock = stock - t.qty
/// FROM (SELECT ? AS id, ? AS qty UNION ALL SELECT ?, ?) AS t
/// WHERE products.id = t.id AND products.stock >= t.qty
/// ```
///
/// The `stock >= qty` predicate only applies on decrease. Returns the number of rows updated; the caller
/// compares it against the batch size and rolls its transaction back on a short count. The map keys the
/// batch by product id, so the statement never names a product twice and rows are visited in ascending id
/// order.
pub async fn adjust_stock(
    qty_by_product: &BTreeMap<i64, i64>,
    direction: StockDirection,
    conn: &mut SqliteConnection,
) -> Result<u64, SettlementError> {
    if qty_by_product.is_empty() {
        return Ok(0);
    }
    for (product_id, quantity) in qty_by_product {
        if *quantity <= 0 {
            return Err(SettlementError::InvalidQuantity { product_id: *product_id, quantity: *quantity });
        }
    }
    let mut builder = QueryBuilder::new("UPDATE products SET stock = stock ");
    builder.push(match direction {
        StockDirection::Increase => "+ t.qty",
        StockDirection::Decrease => "- t.qty",
    });
    builder.push(", updated_at = CURRENT_TIMESTAMP FROM (");
    let mut first = true;
    for (product_id, quantity) in qty_by_product {
        if first {
            builder.push("SELECT ");
            builder.push_bind(*product_id);
            builder.push(" AS id, ");
            builder.push_bind(*quantity);
            builder.push(" AS qty");
            first = false;
        } else {
            builder.push(" UNION ALL SELECT ");
            builder.push_bind(*product_id);
            builder.push(", ");
            builder.push_bind(*quantity);
        }
    }
    builder.push(") AS t WHERE products.id = t.id");
    if direction == StockDirection::Decrease {
        builder.push(" AND products.stock >= t.qty");
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn featured_entries(conn: &mut SqliteConnection) -> Result<Vec<CatalogEntry>, CatalogError> {
    let entries = sqlx::query_as(
        r#"
            SELECT id, name, price, main_image
            FROM products
            WHERE featured = 1
            ORDER BY featured_rank IS NULL, featured_rank ASC, id ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Units sold per product across settled orders since `since`, best sellers first.
pub async fn popular_entries(
    since: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CatalogEntry>, CatalogError> {
    let entries = sqlx::query_as(
        r#"
            SELECT p.id AS id, p.name AS name, p.price AS price, p.main_image AS main_image
            FROM products p
                JOIN (
                    SELECT ol.product_id AS product_id, SUM(ol.quantity) AS sold
                    FROM order_lines ol
                        JOIN orders o ON ol.order_id = o.id
                    WHERE o.status = 'Paid' AND o.created_at >= $1
                    GROUP BY ol.product_id
                    ORDER BY sold DESC
                    LIMIT $2
                ) s ON p.id = s.product_id
            ORDER BY s.sold DESC, p.id ASC
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Applies the featured flags/ranks. Callers wrap this in a transaction; cache invalidation happens after
/// that transaction commits.
pub async fn update_featured(items: &[FeaturedItem], conn: &mut SqliteConnection) -> Result<(), CatalogError> {
    for item in items {
        sqlx::query(
            "UPDATE products SET featured = $1, featured_rank = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3",
        )
        .bind(item.featured)
        .bind(item.featured_rank)
        .bind(item.product_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
