mod support;

use std::collections::BTreeMap;

use checkout_common::Krw;
use checkout_engine::{
    db_types::{OrderSource, OrderStatusType, PaymentMethod},
    order_objects::{ConfirmPaymentRequest, OrderQueryFilter},
    test_utils::seed::{seed_cart_line, seed_product},
    GatewayError,
    InventoryManagement,
    OrderManagement,
    SettlementApi,
    SettlementDatabase,
    SettlementError,
    StockDirection,
    DELIVERY_FEE,
};
use support::settlement_setup;

fn confirm_request(
    order: &checkout_engine::db_types::Order,
    payment_key: &str,
    user_id: i64,
) -> ConfirmPaymentRequest {
    ConfirmPaymentRequest {
        order_number: order.order_number.clone(),
        payment_key: payment_key.to_string(),
        amount: order.final_price,
        user_id,
    }
}

#[tokio::test]
async fn confirm_settles_order_and_reserves_stock() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;

    let order = api.create_direct_order(1, product.id, 2).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Ready);
    assert_eq!(order.final_price, Krw::from(20_000) + DELIVERY_FEE);
    // no stock is reserved at creation time, and the unit price is snapshotted onto the line
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 5);
    let lines = db.fetch_order_lines(order.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 2);
    assert_eq!(lines[0].unit_price, Krw::from(10_000));

    let settled = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap();
    assert_eq!(settled.status, OrderStatusType::Paid);
    assert_eq!(settled.payment_key.as_deref(), Some("pay_key_1"));
    assert_eq!(settled.payment_method, Some(PaymentMethod::Card));
    assert!(settled.approved_at.is_some());
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 3);
    assert_eq!(gateway.confirm_calls(), 1);
    assert_eq!(gateway.cancel_calls(), 0);
}

#[tokio::test]
async fn replayed_confirmation_settles_exactly_once() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    let first = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap();
    let second = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap();
    assert_eq!(first.status, OrderStatusType::Paid);
    assert_eq!(second.status, OrderStatusType::Paid);
    assert_eq!(second.payment_key.as_deref(), Some("pay_key_1"));
    // the decrement happened exactly once, and the replay never reached the provider
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 4);
    assert_eq!(gateway.confirm_calls(), 1);
}

#[tokio::test]
async fn amount_mismatch_leaves_order_and_stock_untouched() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    let mut req = confirm_request(&order, "pay_key_1", 1);
    req.amount = Krw::from(10_000); // forgot the delivery fee
    let err = api.confirm_payment(req).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidAmount { .. }));

    let stored = db.fetch_order_by_number(&order.order_number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Ready);
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 5);
    assert_eq!(gateway.confirm_calls(), 0, "validation failures must precede any provider call");
}

#[tokio::test]
async fn ownership_and_existence_are_validated_first() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    let err = api.confirm_payment(confirm_request(&order, "pay_key_1", 99)).await.unwrap_err();
    assert!(matches!(err, SettlementError::Forbidden(_)));

    let mut req = confirm_request(&order, "pay_key_1", 1);
    req.order_number = "no-such-order".parse().unwrap();
    let err = api.confirm_payment(req).await.unwrap_err();
    assert!(matches!(err, SettlementError::OrderNotFound(_)));
    assert_eq!(gateway.confirm_calls(), 0);
}

#[tokio::test]
async fn provider_rejection_abandons_the_order() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    gateway.fail_confirms_with(GatewayError::Rejected { status: 400, message: "amount mismatch".to_string() });
    let err = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::GatewayRejected(_)));

    // never financially committed, so the order is deleted rather than left in Ready
    assert!(db.fetch_order_by_number(&order.order_number).await.unwrap().is_none());
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 5);
}

#[tokio::test]
async fn provider_outage_abandons_the_order() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    gateway.fail_confirms_with(GatewayError::Unavailable("connect timeout".to_string()));
    let err = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::GatewayUnavailable(_)));
    assert!(db.fetch_order_by_number(&order.order_number).await.unwrap().is_none());
}

#[tokio::test]
async fn late_stock_exhaustion_compensates_to_cancelled() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 1).await;
    let order_a = api.create_direct_order(1, product.id, 1).await.unwrap();
    let order_b = api.create_direct_order(2, product.id, 1).await.unwrap();

    api.confirm_payment(confirm_request(&order_a, "pay_key_a", 1)).await.unwrap();
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 0);

    // the advisory check passed at creation time, so B only learns about the shortage after its charge
    // has been confirmed
    let err = api.confirm_payment(confirm_request(&order_b, "pay_key_b", 2)).await.unwrap_err();
    assert!(matches!(err, SettlementError::StockExhausted(_)));
    assert_eq!(gateway.cancel_calls(), 1);

    let stored = db.fetch_order_by_number(&order_b.order_number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::Cancelled);
    assert_eq!(stored.payment_key.as_deref(), Some("pay_key_b"));
    // the winner is untouched
    let winner = db.fetch_order_by_number(&order_a.order_number).await.unwrap().unwrap();
    assert_eq!(winner.status, OrderStatusType::Paid);
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
async fn failed_reversal_leaves_a_durable_refund_marker() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 1).await;
    let order_a = api.create_direct_order(1, product.id, 1).await.unwrap();
    let order_b = api.create_direct_order(2, product.id, 1).await.unwrap();

    api.confirm_payment(confirm_request(&order_a, "pay_key_a", 1)).await.unwrap();
    gateway.fail_cancels_with(GatewayError::Rejected { status: 403, message: "already settled".to_string() });

    let err = api.confirm_payment(confirm_request(&order_b, "pay_key_b", 2)).await.unwrap_err();
    assert!(matches!(err, SettlementError::CompensationFailed(_)));

    // the marker carries the payment key so an operator can refund by hand
    let stored = db.fetch_order_by_number(&order_b.order_number).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatusType::RefundFailed);
    assert_eq!(stored.payment_key.as_deref(), Some("pay_key_b"));
}

#[tokio::test]
async fn refund_failed_orders_are_discoverable_by_status_search() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 1).await;
    let order_a = api.create_direct_order(1, product.id, 1).await.unwrap();
    let order_b = api.create_direct_order(2, product.id, 1).await.unwrap();
    api.confirm_payment(confirm_request(&order_a, "pay_key_a", 1)).await.unwrap();
    gateway.fail_cancels_with(GatewayError::Unavailable("down".to_string()));
    api.confirm_payment(confirm_request(&order_b, "pay_key_b", 2)).await.unwrap_err();

    let filter = OrderQueryFilter::default().with_status(OrderStatusType::RefundFailed);
    let stuck = db.search_orders(filter).await.unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].order_number, order_b.order_number);
}

#[tokio::test]
async fn concurrent_confirmations_never_oversell() {
    let (db, gateway, api) = settlement_setup().await;
    // the race from the book: price 10 000 + 1 000 delivery fee, one unit of stock, two orders
    let product = seed_product(&db, "Mug", 10_000, 1).await;
    let order_a = api.create_direct_order(1, product.id, 1).await.unwrap();
    let order_b = api.create_direct_order(2, product.id, 1).await.unwrap();
    assert_eq!(order_a.final_price, Krw::from(11_000));

    let api_a = SettlementApi::new(db.clone(), gateway.clone());
    let api_b = SettlementApi::new(db.clone(), gateway.clone());
    let req_a = confirm_request(&order_a, "pay_key_a", 1);
    let req_b = confirm_request(&order_b, "pay_key_b", 2);
    let (res_a, res_b) = tokio::join!(api_a.confirm_payment(req_a), api_b.confirm_payment(req_b));

    let winners = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one of the two settlements may win");
    let loser = if res_a.is_ok() { res_b.unwrap_err() } else { res_a.unwrap_err() };
    assert!(matches!(loser, SettlementError::StockExhausted(_)));

    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 0);
    let a = db.fetch_order_by_number(&order_a.order_number).await.unwrap().unwrap();
    let b = db.fetch_order_by_number(&order_b.order_number).await.unwrap().unwrap();
    let paid = [&a, &b].iter().filter(|o| o.status == OrderStatusType::Paid).count();
    let cancelled = [&a, &b].iter().filter(|o| o.status == OrderStatusType::Cancelled).count();
    assert_eq!((paid, cancelled), (1, 1));
}

#[tokio::test]
async fn concurrent_duplicate_confirmations_settle_once() {
    let (db, gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;
    let order = api.create_direct_order(1, product.id, 1).await.unwrap();

    let api_a = SettlementApi::new(db.clone(), gateway.clone());
    let api_b = SettlementApi::new(db.clone(), gateway.clone());
    let req_a = confirm_request(&order, "pay_key_1", 1);
    let req_b = confirm_request(&order, "pay_key_1", 1);
    let (res_a, res_b) = tokio::join!(api_a.confirm_payment(req_a), api_b.confirm_payment(req_b));

    // both callers see success, the decrement happened exactly once
    assert_eq!(res_a.unwrap().status, OrderStatusType::Paid);
    assert_eq!(res_b.unwrap().status, OrderStatusType::Paid);
    assert_eq!(db.fetch_product(product.id).await.unwrap().unwrap().stock, 4);
}

#[tokio::test]
async fn cart_orders_are_priced_from_cart_lines_and_cleared_after_settlement() {
    let (db, _gateway, api) = settlement_setup().await;
    let mug = seed_product(&db, "Mug", 10_000, 5).await;
    let plate = seed_product(&db, "Plate", 4_000, 5).await;
    let line_a = seed_cart_line(&db, 1, mug.id, 2).await;
    let line_b = seed_cart_line(&db, 1, plate.id, 1).await;

    let order = api.create_cart_order(1, &[line_a.id, line_b.id]).await.unwrap();
    assert_eq!(order.source, OrderSource::Cart);
    assert_eq!(order.label, "Mug (+1 more)");
    assert_eq!(order.final_price, Krw::from(24_000) + DELIVERY_FEE);

    api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap();
    assert_eq!(db.fetch_product(mug.id).await.unwrap().unwrap().stock, 3);
    assert_eq!(db.fetch_product(plate.id).await.unwrap().unwrap().stock, 4);
    // the originating cart lines are gone
    let remaining = db.fetch_cart_lines(1, &[line_a.id, line_b.id]).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn empty_cart_selection_is_rejected() {
    let (_db, _gateway, api) = settlement_setup().await;
    let err = api.create_cart_order(1, &[]).await.unwrap_err();
    assert!(matches!(err, SettlementError::EmptyOrder));
}

#[tokio::test]
async fn multi_product_settlement_never_partially_commits() {
    let (db, gateway, api) = settlement_setup().await;
    let mug = seed_product(&db, "Mug", 10_000, 5).await;
    let plate = seed_product(&db, "Plate", 4_000, 5).await;
    let line_a = seed_cart_line(&db, 1, mug.id, 1).await;
    let line_b = seed_cart_line(&db, 1, plate.id, 2).await;
    let order = api.create_cart_order(1, &[line_a.id, line_b.id]).await.unwrap();

    // a competing purchase drains the plates after the advisory check passed
    let mut drain = BTreeMap::new();
    drain.insert(plate.id, 4);
    assert_eq!(db.conditional_adjust_stock(&drain, StockDirection::Decrease).await.unwrap(), 1);

    let err = api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap_err();
    assert!(matches!(err, SettlementError::StockExhausted(_)));
    assert_eq!(gateway.cancel_calls(), 1);
    // the feasible mug decrement was rolled back together with the infeasible plate one
    assert_eq!(db.fetch_product(mug.id).await.unwrap().unwrap().stock, 5);
    assert_eq!(db.fetch_product(plate.id).await.unwrap().unwrap().stock, 1);
}

#[tokio::test]
async fn settlement_and_cancellation_publish_events() {
    use std::{
        pin::Pin,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use checkout_engine::events::{EventHandlers, EventHooks};

    let (db, gateway, _) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 5).await;

    let paid = Arc::new(AtomicUsize::new(0));
    let annulled = Arc::new(AtomicUsize::new(0));
    let paid_count = paid.clone();
    let annulled_count = annulled.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(move |_| {
        let paid = paid.clone();
        Box::pin(async move {
            paid.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    hooks.on_order_annulled(move |_| {
        let annulled = annulled.clone();
        Box::pin(async move {
            annulled.fetch_add(1, Ordering::SeqCst);
        }) as Pin<Box<dyn std::future::Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let api = SettlementApi::with_producers(db.clone(), gateway.clone(), handlers.producers());
    handlers.start_handlers().await;

    let order = api.create_direct_order(1, product.id, 1).await.unwrap();
    api.confirm_payment(confirm_request(&order, "pay_key_1", 1)).await.unwrap();
    api.cancel_order(&order.order_number, "changed my mind").await.unwrap();

    // the hooks run on spawned tasks; give them a moment to drain
    for _ in 0..100 {
        if paid_count.load(Ordering::SeqCst) == 1 && annulled_count.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(paid_count.load(Ordering::SeqCst), 1);
    assert_eq!(annulled_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn creation_rejects_doomed_orders_early() {
    let (db, _gateway, api) = settlement_setup().await;
    let product = seed_product(&db, "Mug", 10_000, 1).await;

    let err = api.create_direct_order(1, product.id, 2).await.unwrap_err();
    assert!(matches!(err, SettlementError::InsufficientStock(_)));
    let err = api.create_direct_order(1, product.id, 0).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidQuantity { .. }));
    let err = api.create_direct_order(1, 9999, 1).await.unwrap_err();
    assert!(matches!(err, SettlementError::ProductNotFound(9999)));
}
