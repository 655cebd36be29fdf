//! In-memory repository implementations.
//!
//! Same contracts as the SeaORM versions, backed by process-local maps.
//! The test suite runs entirely on these, and they keep the uniqueness
//! and atomicity guarantees the SQL schema provides through indexes and
//! guarded updates.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{category, order, order_item, product, product_variation, stock_movement};
use crate::errors::ServiceError;

use super::{
    CategoryRepository, NewStockMovement, OrderRepository, ProductRepository, StockDelta,
    StockMovementRepository, VariationRepository,
};

#[derive(Debug, Default)]
pub struct InMemoryCategoryRepository {
    rows: DashMap<Uuid, category::Model>,
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn insert(&self, category: category::Model) -> Result<category::Model, ServiceError> {
        if self.rows.iter().any(|row| row.slug == category.slug) {
            return Err(ServiceError::Conflict(format!(
                "Category slug {} already exists",
                category.slug
            )));
        }
        self.rows.insert(category.id, category.clone());
        Ok(category)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<category::Model>, ServiceError> {
        Ok(self.rows.get(&id).map(|row| row.clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<category::Model>, ServiceError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.slug == slug)
            .map(|row| row.clone()))
    }

    async fn list(&self) -> Result<Vec<category::Model>, ServiceError> {
        let mut categories: Vec<_> = self.rows.iter().map(|row| row.clone()).collect();
        categories.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    rows: DashMap<Uuid, product::Model>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn insert(&self, product: product::Model) -> Result<product::Model, ServiceError> {
        if self.rows.iter().any(|row| row.slug == product.slug) {
            return Err(ServiceError::Conflict(format!(
                "Product slug {} already exists",
                product.slug
            )));
        }
        self.rows.insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(self.rows.get(&id).map(|row| row.clone()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<product::Model>, ServiceError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.slug == slug)
            .map(|row| row.clone()))
    }

    async fn list(&self) -> Result<Vec<product::Model>, ServiceError> {
        let mut products: Vec<_> = self.rows.iter().map(|row| row.clone()).collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn list_by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut products: Vec<_> = self
            .rows
            .iter()
            .filter(|row| row.category_id == category_id)
            .map(|row| row.clone())
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<product::Model, ServiceError> {
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
        entry.is_active = active;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryVariationRepository {
    rows: DashMap<Uuid, product_variation::Model>,
}

impl InMemoryVariationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VariationRepository for InMemoryVariationRepository {
    async fn insert(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError> {
        if self.rows.iter().any(|row| row.sku == variation.sku) {
            return Err(ServiceError::Conflict(format!(
                "SKU {} already exists",
                variation.sku
            )));
        }
        self.rows.insert(variation.id, variation.clone());
        Ok(variation)
    }

    async fn update(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError> {
        let mut entry = self.rows.get_mut(&variation.id).ok_or_else(|| {
            ServiceError::NotFound(format!("Variation {} not found", variation.id))
        })?;
        // Everything but stock, which only apply_stock_delta touches.
        entry.sku = variation.sku;
        entry.name = variation.name;
        entry.price = variation.price;
        entry.min_stock = variation.min_stock;
        entry.is_active = variation.is_active;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<product_variation::Model>, ServiceError> {
        Ok(self.rows.get(&id).map(|row| row.clone()))
    }

    async fn find_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<product_variation::Model>, ServiceError> {
        Ok(self
            .rows
            .iter()
            .find(|row| row.sku == sku)
            .map(|row| row.clone()))
    }

    async fn list_by_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_variation::Model>, ServiceError> {
        let mut variations: Vec<_> = self
            .rows
            .iter()
            .filter(|row| row.product_id == product_id)
            .map(|row| row.clone())
            .collect();
        variations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variations)
    }

    async fn list_all(&self) -> Result<Vec<product_variation::Model>, ServiceError> {
        let mut variations: Vec<_> = self.rows.iter().map(|row| row.clone()).collect();
        variations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(variations)
    }

    async fn list_low_stock(&self) -> Result<Vec<product_variation::Model>, ServiceError> {
        let mut variations: Vec<_> = self
            .rows
            .iter()
            .filter(|row| row.is_active && row.stock <= row.min_stock)
            .map(|row| row.clone())
            .collect();
        variations.sort_by(|a, b| a.stock.cmp(&b.stock));
        Ok(variations)
    }

    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> Result<StockDelta, ServiceError> {
        // get_mut holds the shard write lock for the whole read-modify-write,
        // so concurrent deltas against one variation serialize here just as
        // the guarded UPDATE serializes them in SQL.
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Variation {} not found", id)))?;

        let previous = entry.stock;
        let next = previous + delta;
        if next < 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "variation {}. Available: {}, Requested: {}",
                id,
                previous,
                delta.unsigned_abs()
            )));
        }

        entry.stock = next;
        entry.updated_at = Utc::now();
        Ok(StockDelta {
            variation_id: id,
            product_id: entry.product_id,
            previous_stock: previous,
            new_stock: next,
            min_stock: entry.min_stock,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStockMovementRepository {
    rows: Mutex<Vec<stock_movement::Model>>,
}

impl InMemoryStockMovementRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StockMovementRepository for InMemoryStockMovementRepository {
    async fn append(
        &self,
        movement: NewStockMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let model = stock_movement::Model {
            id: Uuid::new_v4(),
            product_id: movement.product_id,
            variation_id: movement.variation_id,
            movement_type: movement.movement_type,
            reason: movement.reason,
            quantity: movement.quantity,
            previous_stock: movement.previous_stock,
            new_stock: movement.new_stock,
            order_token: movement.order_token,
            note: movement.note,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(model.clone());
        Ok(model)
    }

    async fn list_for_order(
        &self,
        order_token: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.order_token.as_deref() == Some(order_token))
            .cloned()
            .collect())
    }

    async fn list_for_product(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|m| m.product_id == product_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: u64) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<Uuid, order::Model>,
    items: DashMap<Uuid, Vec<order_item::Model>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_with_items(
        &self,
        order: order::Model,
        items: Vec<order_item::Model>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        if self.orders.iter().any(|row| row.token == order.token) {
            return Err(ServiceError::Conflict(format!(
                "Order token {} already exists",
                order.token
            )));
        }
        self.orders.insert(order.id, order.clone());
        self.items.insert(order.id, items.clone());
        Ok((order, items))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(self.orders.get(&id).map(|row| row.clone()))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<order::Model>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|row| row.token == token)
            .map(|row| row.clone()))
    }

    async fn items_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(self
            .items
            .get(&order_id)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_payment(
        &self,
        token: &str,
        payment_status: PaymentStatus,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let id = self
            .orders
            .iter()
            .find(|row| row.token == token)
            .map(|row| row.id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with token {} not found", token))
            })?;

        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        entry.payment_status = payment_status;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn set_preference(&self, id: Uuid, preference_id: String) -> Result<(), ServiceError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
        entry.preference_id = Some(preference_id);
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut orders: Vec<_> = self.orders.iter().map(|row| row.clone()).collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = orders.len() as u64;
        let start = page.saturating_sub(1) * per_page;
        let page_rows = orders
            .into_iter()
            .skip(start as usize)
            .take(per_page as usize)
            .collect();
        Ok((page_rows, total))
    }
}
