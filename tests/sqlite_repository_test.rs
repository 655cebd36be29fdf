//! SeaORM repository tests against a real migrated SQLite file.
//!
//! Ignored by default so the suite stays hermetic; run with
//! `cargo test -- --ignored` where a writable working directory exists.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use storefront_api::db::{establish_connection_with_config, run_migrations, DbConfig};
use storefront_api::entities::stock_movement::{MovementReason, MovementType};
use storefront_api::entities::{category, product, product_variation};
use storefront_api::errors::ServiceError;
use storefront_api::repositories::{NewStockMovement, Repositories};

async fn migrated_repositories(db_file: &str) -> Repositories {
    let _ = std::fs::remove_file(db_file);
    // SQLite wants a single writer; timeouts keep their defaults.
    let config = DbConfig {
        url: format!("sqlite://{db_file}?mode=rwc"),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let pool = establish_connection_with_config(&config)
        .await
        .expect("connect to sqlite");
    run_migrations(&pool).await.expect("run migrations");
    Repositories::sql(Arc::new(pool))
}

async fn seed_catalog(repos: &Repositories, sku: &str, stock: i32) -> product_variation::Model {
    let now = Utc::now();
    let cat = repos
        .categories
        .insert(category::Model {
            id: Uuid::new_v4(),
            name: "Pantry".to_string(),
            slug: format!("pantry-{}", Uuid::new_v4().simple()),
            description: None,
            sort_order: 0,
            is_active: true,
            created_at: now,
        })
        .await
        .expect("insert category");
    let prod = repos
        .products
        .insert(product::Model {
            id: Uuid::new_v4(),
            category_id: cat.id,
            name: "Granola".to_string(),
            slug: format!("granola-{}", Uuid::new_v4().simple()),
            description: Some("Oats and honey".to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("insert product");
    repos
        .variations
        .insert(product_variation::Model {
            id: Uuid::new_v4(),
            product_id: prod.id,
            sku: sku.to_string(),
            name: "1kg bag".to_string(),
            price: dec!(8.2500),
            stock,
            min_stock: 2,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("insert variation")
}

#[tokio::test]
#[ignore = "requires a writable SQLite environment"]
async fn migrated_schema_round_trips_the_catalog() {
    let repos = migrated_repositories("storefront_schema_test.db").await;
    let variation = seed_catalog(&repos, "GRAN-1KG", 10).await;

    let by_sku = repos
        .variations
        .find_by_sku("GRAN-1KG")
        .await
        .unwrap()
        .expect("variation by sku");
    assert_eq!(by_sku.id, variation.id);
    assert_eq!(by_sku.stock, 10);
    assert_eq!(by_sku.price, dec!(8.2500));

    let listed = repos.variations.list_by_product(variation.product_id).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
#[ignore = "requires a writable SQLite environment"]
async fn guarded_delta_enforces_the_floor_in_sql() {
    let repos = migrated_repositories("storefront_delta_test.db").await;
    let variation = seed_catalog(&repos, "DELTA-1", 10).await;

    let snapshot = repos.variations.apply_stock_delta(variation.id, -3).await.unwrap();
    assert_eq!(snapshot.previous_stock, 10);
    assert_eq!(snapshot.new_stock, 7);

    let err = repos
        .variations
        .apply_stock_delta(variation.id, -8)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The failed delta must not have moved anything.
    let current = repos.variations.find_by_id(variation.id).await.unwrap().unwrap();
    assert_eq!(current.stock, 7);

    let err = repos
        .variations
        .apply_stock_delta(Uuid::new_v4(), -1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires a writable SQLite environment"]
async fn movements_survive_the_database_round_trip() {
    let repos = migrated_repositories("storefront_ledger_test.db").await;
    let variation = seed_catalog(&repos, "LEDGER-1", 5).await;

    let written = repos
        .movements
        .append(NewStockMovement {
            product_id: variation.product_id,
            variation_id: variation.id,
            movement_type: MovementType::Out,
            reason: MovementReason::Sale,
            quantity: 2,
            previous_stock: 5,
            new_stock: 3,
            order_token: Some("ord-roundtrip".to_string()),
            note: None,
        })
        .await
        .expect("append movement");

    let slice = repos.movements.list_for_order("ord-roundtrip").await.unwrap();
    assert_eq!(slice.len(), 1);
    assert_eq!(slice[0].id, written.id);
    assert_eq!(slice[0].movement_type.as_str(), "OUT");
    assert_eq!(slice[0].reason.as_str(), "SALE");
    assert_eq!(slice[0].previous_stock, 5);
    assert_eq!(slice[0].new_stock, 3);
}

#[tokio::test]
#[ignore = "requires a writable SQLite environment"]
async fn low_stock_listing_is_inclusive_at_the_minimum() {
    let repos = migrated_repositories("storefront_lowstock_test.db").await;
    let at_minimum = seed_catalog(&repos, "LOW-1", 2).await;
    let _above = seed_catalog(&repos, "LOW-2", 3).await;

    let low = repos.variations.list_low_stock().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].id, at_minimum.id);
}
