use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::stock_movement::{MovementReason, MovementType};
use crate::entities::{category, product, product_variation};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{CategoryRepository, ProductRepository, VariationRepository};
use crate::services::stock_accounting::{AdjustStockInput, StockAccountingService};

/// Catalog management: categories, products and their variations.
///
/// Creation endpoints are admin-facing. Variations are inserted with zero
/// stock; any opening quantity is routed through stock accounting so the
/// very first unit already has a ledger record.
#[derive(Clone)]
pub struct CatalogService {
    categories: Arc<dyn CategoryRepository>,
    products: Arc<dyn ProductRepository>,
    variations: Arc<dyn VariationRepository>,
    accounting: StockAccountingService,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// Optional explicit slug; derived from the name when absent.
    #[validate(length(min = 1, max = 120))]
    pub slug: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 160))]
    pub name: String,
    #[validate(length(min = 1, max = 160))]
    pub slug: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVariationInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub price: Decimal,
    /// Initial quantity, recorded as an `IN`/`ADJUSTMENT` movement.
    #[validate(range(min = 0))]
    pub opening_stock: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateVariationInput {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

/// Lowercases, maps runs of non-alphanumeric characters to single dashes
/// and trims them from the ends. "Frutos  Secos!" becomes "frutos-secos".
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn ensure_non_negative_price(price: Decimal) -> Result<(), ServiceError> {
    if price < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "Price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

impl CatalogService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        products: Arc<dyn ProductRepository>,
        variations: Arc<dyn VariationRepository>,
        accounting: StockAccountingService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            categories,
            products,
            variations,
            accounting,
            event_sender,
        }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let slug = slugify(input.slug.as_deref().unwrap_or(&input.name));
        if slug.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Name does not produce a usable slug".to_string(),
            ));
        }
        if self.categories.find_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Category slug '{}' already exists",
                slug
            )));
        }

        let category = self
            .categories
            .insert(category::Model {
                id: Uuid::new_v4(),
                name: input.name,
                slug,
                description: input.description,
                sort_order: input.sort_order.unwrap_or(0),
                is_active: true,
                created_at: Utc::now(),
            })
            .await?;

        self.event_sender
            .send_or_log(Event::CategoryCreated(category.id))
            .await;
        info!(category_id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        self.categories.list().await
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        self.categories
            .find_by_id(input.category_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", input.category_id))
            })?;

        let slug = slugify(input.slug.as_deref().unwrap_or(&input.name));
        if slug.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Name does not produce a usable slug".to_string(),
            ));
        }
        if self.products.find_by_slug(&slug).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product slug '{}' already exists",
                slug
            )));
        }

        let now = Utc::now();
        let product = self
            .products
            .insert(product::Model {
                id: Uuid::new_v4(),
                category_id: input.category_id,
                name: input.name,
                slug,
                description: input.description,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;
        info!(product_id = %product.id, slug = %product.slug, "Product created");
        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<product::Model>, ServiceError> {
        self.products.list().await
    }

    pub async fn products_by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<product::Model>, ServiceError> {
        self.categories
            .find_by_id(category_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", category_id))
            })?;
        self.products.list_by_category(category_id).await
    }

    pub async fn get_product(
        &self,
        id: Uuid,
    ) -> Result<(product::Model, Vec<product_variation::Model>), ServiceError> {
        let product = self
            .products
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
        let variations = self.variations.list_by_product(id).await?;
        Ok((product, variations))
    }

    /// Deactivation takes the product's variations off sale with it.
    /// Reactivation does not cascade back; variations deactivated on their
    /// own stay that way.
    pub async fn set_product_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<product::Model, ServiceError> {
        let product = self.products.set_active(id, active).await?;
        if !active {
            for mut variation in self.variations.list_by_product(id).await? {
                if variation.is_active {
                    variation.is_active = false;
                    self.variations.update(variation).await?;
                }
            }
        }
        info!(product_id = %id, active, "Product availability changed");
        Ok(product)
    }

    /// Creates a variation and, when an opening quantity is given, books
    /// it through stock accounting so the ledger starts at the true zero.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_variation(
        &self,
        input: CreateVariationInput,
    ) -> Result<product_variation::Model, ServiceError> {
        input.validate()?;
        ensure_non_negative_price(input.price)?;

        let sku = input.sku.trim().to_string();
        if sku.is_empty() {
            return Err(ServiceError::InvalidInput("SKU cannot be blank".to_string()));
        }

        let product = self
            .products
            .find_by_id(input.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product '{}' is deactivated",
                product.slug
            )));
        }
        if self.variations.find_by_sku(&sku).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "SKU '{}' already exists",
                sku
            )));
        }

        let now = Utc::now();
        let mut variation = self
            .variations
            .insert(product_variation::Model {
                id: Uuid::new_v4(),
                product_id: input.product_id,
                sku,
                name: input.name,
                price: input.price,
                stock: 0,
                min_stock: input.min_stock.unwrap_or(0),
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;

        let opening = input.opening_stock.unwrap_or(0);
        if opening > 0 {
            let movement = self
                .accounting
                .adjust_stock(AdjustStockInput {
                    variation_id: variation.id,
                    movement_type: MovementType::In,
                    quantity: opening,
                    reason: Some(MovementReason::Adjustment),
                    note: Some("opening stock".to_string()),
                })
                .await?;
            variation.stock = movement.new_stock;
        }

        self.event_sender
            .send_or_log(Event::VariationCreated {
                product_id: variation.product_id,
                variation_id: variation.id,
            })
            .await;
        info!(
            variation_id = %variation.id,
            sku = %variation.sku,
            opening_stock = opening,
            "Variation created"
        );
        Ok(variation)
    }

    /// Edits catalog fields of a variation. Stock is out of scope here;
    /// it only moves through stock accounting.
    #[instrument(skip(self, input))]
    pub async fn update_variation(
        &self,
        id: Uuid,
        input: UpdateVariationInput,
    ) -> Result<product_variation::Model, ServiceError> {
        input.validate()?;
        if let Some(price) = input.price {
            ensure_non_negative_price(price)?;
        }

        let mut variation = self
            .variations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variation {} not found", id)))?;

        if let Some(name) = input.name {
            variation.name = name;
        }
        if let Some(price) = input.price {
            variation.price = price;
        }
        if let Some(min_stock) = input.min_stock {
            variation.min_stock = min_stock;
        }
        if let Some(is_active) = input.is_active {
            variation.is_active = is_active;
        }

        let updated = self.variations.update(variation).await?;
        info!(variation_id = %id, "Variation updated");
        Ok(updated)
    }

    pub async fn get_variation(
        &self,
        id: Uuid,
    ) -> Result<product_variation::Model, ServiceError> {
        self.variations
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Variation {} not found", id)))
    }
}
