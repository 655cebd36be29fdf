pub mod memory;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::stock_movement::{MovementReason, MovementType};
use crate::entities::{category, order, order_item, product, product_variation, stock_movement};
use crate::errors::ServiceError;

/// Snapshot pair produced by an atomic stock delta, together with the
/// owning product and threshold so the ledger write and the low-stock
/// check need no second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockDelta {
    pub variation_id: Uuid,
    pub product_id: Uuid,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub min_stock: i32,
}

/// Movement fields supplied by the caller; the repository assigns the id
/// and creation timestamp.
#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub product_id: Uuid,
    pub variation_id: Uuid,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity: i32,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub order_token: Option<String>,
    pub note: Option<String>,
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn insert(&self, category: category::Model) -> Result<category::Model, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<category::Model>, ServiceError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<category::Model>, ServiceError>;
    /// All categories ordered by sort order, then name.
    async fn list(&self) -> Result<Vec<category::Model>, ServiceError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn insert(&self, product: product::Model) -> Result<product::Model, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<product::Model>, ServiceError>;
    async fn list(&self) -> Result<Vec<product::Model>, ServiceError>;
    async fn list_by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError>;
    async fn set_active(&self, id: Uuid, active: bool) -> Result<product::Model, ServiceError>;
}

#[async_trait]
pub trait VariationRepository: Send + Sync {
    async fn insert(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError>;
    /// Persists catalog fields (sku, name, price, min_stock, is_active).
    /// Never writes `stock`: that column only moves through
    /// `apply_stock_delta`, so a catalog edit racing a sale cannot
    /// resurrect a stale quantity.
    async fn update(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError>;
    async fn find_by_id(&self, id: Uuid)
        -> Result<Option<product_variation::Model>, ServiceError>;
    async fn find_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<product_variation::Model>, ServiceError>;
    async fn list_by_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_variation::Model>, ServiceError>;
    async fn list_all(&self) -> Result<Vec<product_variation::Model>, ServiceError>;
    /// Active variations at or below their minimum-stock threshold.
    async fn list_low_stock(&self) -> Result<Vec<product_variation::Model>, ServiceError>;

    /// Atomically applies `delta` (positive or negative) to the variation's
    /// stock and returns the before/after snapshot.
    ///
    /// The read-modify-write happens at the storage boundary, never in
    /// application code: concurrent deltas against the same variation
    /// serialize and neither update is lost. A delta that would take stock
    /// below zero fails with `InsufficientStock` and mutates nothing.
    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> Result<StockDelta, ServiceError>;
}

/// Append-only ledger access. Deliberately exposes no update or delete:
/// a movement written once is immutable.
#[async_trait]
pub trait StockMovementRepository: Send + Sync {
    async fn append(
        &self,
        movement: NewStockMovement,
    ) -> Result<stock_movement::Model, ServiceError>;
    async fn list_for_order(
        &self,
        order_token: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>;
    async fn list_for_product(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>;
    async fn list_recent(&self, limit: u64) -> Result<Vec<stock_movement::Model>, ServiceError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the order and its items in one storage transaction.
    async fn insert_with_items(
        &self,
        order: order::Model,
        items: Vec<order_item::Model>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<order::Model>, ServiceError>;
    async fn items_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError>;
    /// Applies a verified payment outcome to the order found by token.
    async fn update_payment(
        &self,
        token: &str,
        payment_status: PaymentStatus,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError>;
    async fn set_preference(&self, id: Uuid, preference_id: String) -> Result<(), ServiceError>;
    /// Newest first. Returns the requested page plus the total row count.
    async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError>;
}

/// The full set of storage handles the services are wired with.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<dyn CategoryRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub variations: Arc<dyn VariationRepository>,
    pub movements: Arc<dyn StockMovementRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Repositories {
    /// SeaORM-backed repositories sharing one connection pool.
    pub fn sql(db: Arc<DatabaseConnection>) -> Self {
        Self {
            categories: Arc::new(sql::SqlCategoryRepository::new(db.clone())),
            products: Arc::new(sql::SqlProductRepository::new(db.clone())),
            variations: Arc::new(sql::SqlVariationRepository::new(db.clone())),
            movements: Arc::new(sql::SqlStockMovementRepository::new(db.clone())),
            orders: Arc::new(sql::SqlOrderRepository::new(db)),
        }
    }

    /// In-memory repositories backing the test suite. No database required.
    pub fn in_memory() -> Self {
        Self {
            categories: Arc::new(memory::InMemoryCategoryRepository::new()),
            products: Arc::new(memory::InMemoryProductRepository::new()),
            variations: Arc::new(memory::InMemoryVariationRepository::new()),
            movements: Arc::new(memory::InMemoryStockMovementRepository::new()),
            orders: Arc::new(memory::InMemoryOrderRepository::new()),
        }
    }
}
