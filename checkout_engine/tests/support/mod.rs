#![allow(dead_code)]
use checkout_engine::{
    test_utils::{prepare_test_env, random_db_path, MockGateway},
    SettlementApi,
    SqliteDatabase,
};

pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

pub async fn settlement_setup() -> (SqliteDatabase, MockGateway, SettlementApi<SqliteDatabase, MockGateway>) {
    let db = new_test_db().await;
    let gateway = MockGateway::new();
    let api = SettlementApi::new(db.clone(), gateway.clone());
    (db, gateway, api)
}
