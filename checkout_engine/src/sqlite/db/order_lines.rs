use std::collections::BTreeMap;

use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrderLine, OrderLine},
    traits::SettlementError,
};

/// Inserts the line items for an order. Lines are written in ascending product id order so that concurrent
/// order inserts touching the same products acquire locks in a consistent order.
pub async fn insert_order_lines(
    order_id: i64,
    lines: &[NewOrderLine],
    conn: &mut SqliteConnection,
) -> Result<(), SettlementError> {
    if lines.is_empty() {
        return Err(SettlementError::EmptyOrder);
    }
    let mut sorted = lines.to_vec();
    sorted.sort_by_key(|l| l.product_id);
    let mut builder = QueryBuilder::new("INSERT INTO order_lines (order_id, product_id, quantity, unit_price) ");
    builder.push_values(sorted.iter(), |mut row, line| {
        row.push_bind(order_id).push_bind(line.product_id).push_bind(line.quantity).push_bind(line.unit_price);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

pub async fn fetch_order_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLine>, sqlx::Error> {
    let lines = sqlx::query_as("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY product_id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(lines)
}

/// Aggregates line items into the per-product quantity batch used for stock adjustment. The `BTreeMap`
/// both deduplicates products and fixes the ascending iteration order the batched update relies on.
pub fn quantities_by_product(lines: &[OrderLine]) -> BTreeMap<i64, i64> {
    let mut quantities = BTreeMap::new();
    for line in lines {
        *quantities.entry(line.product_id).or_insert(0) += line.quantity;
    }
    quantities
}

#[cfg(test)]
mod test {
    use checkout_common::Krw;

    use super::*;

    #[test]
    fn quantities_are_summed_and_sorted() {
        let line = |product_id, quantity| OrderLine {
            id: 0,
            order_id: 1,
            product_id,
            quantity,
            unit_price: Krw::from(1000),
        };
        let lines = vec![line(7, 2), line(3, 1), line(7, 1)];
        let quantities = quantities_by_product(&lines);
        assert_eq!(quantities.len(), 2);
        assert_eq!(quantities[&7], 3);
        assert_eq!(quantities[&3], 1);
        assert_eq!(quantities.keys().copied().collect::<Vec<_>>(), vec![3, 7]);
    }
}
