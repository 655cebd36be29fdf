use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use storefront_api::entities::order::{OrderStatus, PaymentStatus};
use storefront_api::entities::{order, order_item, product_variation};
use storefront_api::errors::ServiceError;
use storefront_api::events::EventSender;
use storefront_api::repositories::Repositories;
use storefront_api::services::stock_accounting::StockAccountingService;
use storefront_api::services::stock_movements::StockMovementService;
use tokio::sync::mpsc;
use uuid::Uuid;

fn one_unit_order(n: usize, variation_id: Uuid) -> (order::Model, Vec<order_item::Model>) {
    let now = Utc::now();
    let order = order::Model {
        id: Uuid::new_v4(),
        token: format!("ord-contention-{}", n),
        customer_name: format!("Customer {}", n),
        customer_email: format!("customer{}@example.com", n),
        payment_method: "card".to_string(),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        preference_id: None,
        total: dec!(5.0000),
        created_at: now,
        updated_at: now,
    };
    let items = vec![order_item::Model {
        id: Uuid::new_v4(),
        order_id: order.id,
        variation_id: Some(variation_id),
        product_name: "Contested product".to_string(),
        variation_name: "Only size".to_string(),
        quantity: 1,
        unit_price: dec!(5.0000),
        total: dec!(5.0000),
    }];
    (order, items)
}

// Twenty orders race for ten units. Exactly ten may win, the rest must fail
// with InsufficientStock, and the ledger must account for every unit sold.
#[tokio::test]
async fn contended_orders_sell_exactly_the_available_stock() {
    let repos = Repositories::in_memory();
    let (tx, _rx) = mpsc::channel(64);
    let service = StockAccountingService::new(
        repos.variations.clone(),
        StockMovementService::new(repos.movements.clone()),
        Arc::new(EventSender::new(tx)),
    );

    let now = Utc::now();
    let variation = repos
        .variations
        .insert(product_variation::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            sku: "CONT-1".to_string(),
            name: "Only size".to_string(),
            price: dec!(5.0000),
            stock: 10,
            min_stock: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("seed variation");

    let mut tasks = Vec::new();
    for n in 0..20 {
        let service = service.clone();
        let variation_id = variation.id;
        tasks.push(tokio::spawn(async move {
            let (order, items) = one_unit_order(n, variation_id);
            service.discount_from_order(&order, &items).await
        }));
    }

    let mut sold = 0;
    for task in tasks {
        match task.await.expect("accounting task panicked") {
            Ok(movements) => {
                assert_eq!(movements.len(), 1);
                sold += 1;
            }
            Err(err) => {
                assert!(
                    matches!(err, ServiceError::InsufficientStock(_)),
                    "losing orders must fail on stock, got: {}",
                    err
                );
            }
        }
    }
    assert_eq!(sold, 10, "exactly the available stock should be sold");

    let current = repos
        .variations
        .find_by_id(variation.id)
        .await
        .unwrap()
        .expect("variation still present");
    assert_eq!(current.stock, 0);

    // One ledger record per winning order, each moving exactly one unit.
    let ledger = repos
        .movements
        .list_for_product(variation.product_id, 50)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 10);
    for movement in &ledger {
        assert_eq!(movement.quantity, 1);
        assert_eq!(movement.previous_stock - movement.new_stock, 1);
    }
    let drained: i32 = ledger.iter().map(|m| m.quantity).sum();
    assert_eq!(drained, 10);
}
