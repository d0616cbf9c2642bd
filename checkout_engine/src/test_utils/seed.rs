use checkout_common::Krw;

use crate::{
    db_types::{CartLine, NewProduct, Product},
    sqlite::db::carts,
    traits::CatalogDatabase,
    SqliteDatabase,
};

pub async fn seed_product(db: &SqliteDatabase, name: &str, price: i64, stock: i64) -> Product {
    db.insert_product(NewProduct { name: name.to_string(), price: Krw::from(price), stock, main_image: None })
        .await
        .expect("Error seeding product")
}

pub async fn seed_product_with_image(db: &SqliteDatabase, name: &str, price: i64, stock: i64, image: &str) -> Product {
    db.insert_product(NewProduct {
        name: name.to_string(),
        price: Krw::from(price),
        stock,
        main_image: Some(image.to_string()),
    })
    .await
    .expect("Error seeding product")
}

pub async fn seed_cart_line(db: &SqliteDatabase, user_id: i64, product_id: i64, quantity: i64) -> CartLine {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    carts::insert_cart_line(user_id, product_id, quantity, &mut conn).await.expect("Error seeding cart line")
}
