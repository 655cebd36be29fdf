use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{category, order, order_item, product, product_variation, stock_movement};
use crate::errors::ServiceError;

use super::{
    CategoryRepository, NewStockMovement, OrderRepository, ProductRepository, StockDelta,
    StockMovementRepository, VariationRepository,
};

#[derive(Debug)]
pub struct SqlCategoryRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlCategoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn insert(&self, category: category::Model) -> Result<category::Model, ServiceError> {
        let active = category::ActiveModel {
            id: Set(category.id),
            name: Set(category.name),
            slug: Set(category.slug),
            description: Set(category.description),
            sort_order: Set(category.sort_order),
            is_active: Set(category.is_active),
            created_at: Set(category.created_at),
        };
        active
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<category::Model>, ServiceError> {
        category::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<category::Model>, ServiceError> {
        category::Entity::find()
            .filter(category::Column::Slug.eq(slug))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list(&self) -> Result<Vec<category::Model>, ServiceError> {
        category::Entity::find()
            .order_by_asc(category::Column::SortOrder)
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

#[derive(Debug)]
pub struct SqlProductRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for SqlProductRepository {
    async fn insert(&self, product: product::Model) -> Result<product::Model, ServiceError> {
        let active = product::ActiveModel {
            id: Set(product.id),
            category_id: Set(product.category_id),
            name: Set(product.name),
            slug: Set(product.slug),
            description: Set(product.description),
            is_active: Set(product.is_active),
            created_at: Set(product.created_at),
            updated_at: Set(product.updated_at),
        };
        active
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list(&self) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find()
            .order_by_asc(product::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        product::Entity::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .order_by_asc(product::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<product::Model, ServiceError> {
        let existing = product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut model: product::ActiveModel = existing.into();
        model.is_active = Set(active);
        model.updated_at = Set(Utc::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

#[derive(Debug)]
pub struct SqlVariationRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlVariationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VariationRepository for SqlVariationRepository {
    async fn insert(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError> {
        let active = product_variation::ActiveModel {
            id: Set(variation.id),
            product_id: Set(variation.product_id),
            sku: Set(variation.sku),
            name: Set(variation.name),
            price: Set(variation.price),
            stock: Set(variation.stock),
            min_stock: Set(variation.min_stock),
            is_active: Set(variation.is_active),
            created_at: Set(variation.created_at),
            updated_at: Set(variation.updated_at),
        };
        active
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn update(
        &self,
        variation: product_variation::Model,
    ) -> Result<product_variation::Model, ServiceError> {
        let existing = product_variation::Entity::find_by_id(variation.id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Variation {} not found", variation.id))
            })?;

        // Stock is left out of the SET clause on purpose.
        let mut model: product_variation::ActiveModel = existing.into();
        model.sku = Set(variation.sku);
        model.name = Set(variation.name);
        model.price = Set(variation.price);
        model.min_stock = Set(variation.min_stock);
        model.is_active = Set(variation.is_active);
        model.updated_at = Set(Utc::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<product_variation::Model>, ServiceError> {
        product_variation::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_sku(
        &self,
        sku: &str,
    ) -> Result<Option<product_variation::Model>, ServiceError> {
        product_variation::Entity::find()
            .filter(product_variation::Column::Sku.eq(sku))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_by_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<product_variation::Model>, ServiceError> {
        product_variation::Entity::find()
            .filter(product_variation::Column::ProductId.eq(product_id))
            .order_by_asc(product_variation::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_all(&self) -> Result<Vec<product_variation::Model>, ServiceError> {
        product_variation::Entity::find()
            .order_by_asc(product_variation::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_low_stock(&self) -> Result<Vec<product_variation::Model>, ServiceError> {
        product_variation::Entity::find()
            .filter(product_variation::Column::IsActive.eq(true))
            .filter(
                Expr::col(product_variation::Column::Stock)
                    .lte(Expr::col(product_variation::Column::MinStock)),
            )
            .order_by_asc(product_variation::Column::Stock)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> Result<StockDelta, ServiceError> {
        self.db
            .transaction::<_, StockDelta, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Single guarded UPDATE: the increment and the floor check
                    // happen in one statement, so no interleaving can oversell.
                    let result = product_variation::Entity::update_many()
                        .col_expr(
                            product_variation::Column::Stock,
                            Expr::col(product_variation::Column::Stock).add(delta),
                        )
                        .col_expr(
                            product_variation::Column::UpdatedAt,
                            Expr::value(Utc::now()),
                        )
                        .filter(product_variation::Column::Id.eq(id))
                        .filter(product_variation::Column::Stock.gte(-delta))
                        .exec(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    if result.rows_affected == 0 {
                        let current = product_variation::Entity::find_by_id(id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        return Err(match current {
                            Some(row) => ServiceError::InsufficientStock(format!(
                                "variation {}. Available: {}, Requested: {}",
                                id,
                                row.stock,
                                delta.unsigned_abs()
                            )),
                            None => {
                                ServiceError::NotFound(format!("Variation {} not found", id))
                            }
                        });
                    }

                    // The updated row stays locked until commit, so this read
                    // observes exactly the stock our UPDATE produced.
                    let row = product_variation::Entity::find_by_id(id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Variation {} not found", id))
                        })?;

                    Ok(StockDelta {
                        variation_id: id,
                        product_id: row.product_id,
                        previous_stock: row.stock - delta,
                        new_stock: row.stock,
                        min_stock: row.min_stock,
                    })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }
}

#[derive(Debug)]
pub struct SqlStockMovementRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlStockMovementRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StockMovementRepository for SqlStockMovementRepository {
    async fn append(
        &self,
        movement: NewStockMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let active = stock_movement::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(movement.product_id),
            variation_id: Set(movement.variation_id),
            movement_type: Set(movement.movement_type),
            reason: Set(movement.reason),
            quantity: Set(movement.quantity),
            previous_stock: Set(movement.previous_stock),
            new_stock: Set(movement.new_stock),
            order_token: Set(movement.order_token),
            note: Set(movement.note),
            created_at: Set(Utc::now()),
        };
        active
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_for_order(
        &self,
        order_token: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::OrderToken.eq(order_token))
            .order_by_asc(stock_movement::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_for_product(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn list_recent(&self, limit: u64) -> Result<Vec<stock_movement::Model>, ServiceError> {
        stock_movement::Entity::find()
            .order_by_desc(stock_movement::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

#[derive(Debug)]
pub struct SqlOrderRepository {
    db: Arc<DatabaseConnection>,
}

impl SqlOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn insert_with_items(
        &self,
        order: order::Model,
        items: Vec<order_item::Model>,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        self.db
            .transaction::<_, (order::Model, Vec<order_item::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let active = order::ActiveModel {
                            id: Set(order.id),
                            token: Set(order.token),
                            customer_name: Set(order.customer_name),
                            customer_email: Set(order.customer_email),
                            payment_method: Set(order.payment_method),
                            status: Set(order.status),
                            payment_status: Set(order.payment_status),
                            preference_id: Set(order.preference_id),
                            total: Set(order.total),
                            created_at: Set(order.created_at),
                            updated_at: Set(order.updated_at),
                        };
                        let saved_order = active
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let mut saved_items = Vec::with_capacity(items.len());
                        for item in items {
                            let active_item = order_item::ActiveModel {
                                id: Set(item.id),
                                order_id: Set(item.order_id),
                                variation_id: Set(item.variation_id),
                                product_name: Set(item.product_name),
                                variation_name: Set(item.variation_name),
                                quantity: Set(item.quantity),
                                unit_price: Set(item.unit_price),
                                total: Set(item.total),
                            };
                            saved_items.push(
                                active_item
                                    .insert(txn)
                                    .await
                                    .map_err(ServiceError::db_error)?,
                            );
                        }

                        Ok((saved_order, saved_items))
                    })
                },
            )
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<order::Model>, ServiceError> {
        order::Entity::find()
            .filter(order::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn items_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let mut model: order::ActiveModel = existing.into();
        model.status = Set(status);
        model.updated_at = Set(Utc::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn update_payment(
        &self,
        token: &str,
        payment_status: PaymentStatus,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let existing = self
            .find_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order with token {} not found", token)))?;

        let mut model: order::ActiveModel = existing.into();
        model.payment_status = Set(payment_status);
        model.status = Set(status);
        model.updated_at = Set(Utc::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn set_preference(&self, id: Uuid, preference_id: String) -> Result<(), ServiceError> {
        let existing = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        let mut model: order::ActiveModel = existing.into();
        model.preference_id = Set(Some(preference_id));
        model.updated_at = Set(Utc::now());
        model
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((orders, total))
    }
}
