use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{category, product, product_variation};
use crate::errors::ServiceError;
use crate::repositories::{CategoryRepository, ProductRepository, VariationRepository};

/// Read-only projection of the whole catalog with live stock figures.
///
/// Nothing here is cached or stored: every call recomputes the alert flag
/// from the current stock and threshold, so the dashboard can never show a
/// stale alert.
#[derive(Clone)]
pub struct InventoryOverviewService {
    categories: Arc<dyn CategoryRepository>,
    products: Arc<dyn ProductRepository>,
    variations: Arc<dyn VariationRepository>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VariationOverview {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    pub is_active: bool,
    /// True when stock is at or below the minimum.
    pub alert: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductOverview {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub variations: Vec<VariationOverview>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryOverview {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub products: Vec<ProductOverview>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LowStockVariation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub name: String,
    pub stock: i32,
    pub min_stock: i32,
}

impl InventoryOverviewService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        products: Arc<dyn ProductRepository>,
        variations: Arc<dyn VariationRepository>,
    ) -> Self {
        Self {
            categories,
            products,
            variations,
        }
    }

    /// Builds the category -> product -> variation tree.
    ///
    /// An empty store yields an empty list. Categories without products and
    /// products without variations still appear, with empty children, so
    /// the admin sees exactly what exists.
    #[instrument(skip(self))]
    pub async fn get_overview(&self) -> Result<Vec<CategoryOverview>, ServiceError> {
        let categories = self.categories.list().await?;
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let products = self.products.list().await?;
        let variations = self.variations.list_all().await?;

        let mut variations_by_product: HashMap<Uuid, Vec<product_variation::Model>> =
            HashMap::new();
        for variation in variations {
            variations_by_product
                .entry(variation.product_id)
                .or_default()
                .push(variation);
        }

        let mut products_by_category: HashMap<Uuid, Vec<product::Model>> = HashMap::new();
        for product in products {
            products_by_category
                .entry(product.category_id)
                .or_default()
                .push(product);
        }

        Ok(categories
            .into_iter()
            .map(|cat| {
                Self::category_overview(cat, &mut products_by_category, &mut variations_by_product)
            })
            .collect())
    }

    /// Active variations currently at or below their threshold, most
    /// critical first.
    #[instrument(skip(self))]
    pub async fn low_stock_variations(&self) -> Result<Vec<LowStockVariation>, ServiceError> {
        let low = self.variations.list_low_stock().await?;
        if low.is_empty() {
            return Ok(Vec::new());
        }

        let product_names: HashMap<Uuid, String> = self
            .products
            .list()
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        Ok(low
            .into_iter()
            .map(|v| LowStockVariation {
                id: v.id,
                product_id: v.product_id,
                product_name: product_names
                    .get(&v.product_id)
                    .cloned()
                    .unwrap_or_default(),
                sku: v.sku,
                name: v.name,
                stock: v.stock,
                min_stock: v.min_stock,
            })
            .collect())
    }

    fn category_overview(
        category: category::Model,
        products_by_category: &mut HashMap<Uuid, Vec<product::Model>>,
        variations_by_product: &mut HashMap<Uuid, Vec<product_variation::Model>>,
    ) -> CategoryOverview {
        let products = products_by_category
            .remove(&category.id)
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                let variations = variations_by_product
                    .remove(&p.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| {
                        let alert = v.is_low_stock();
                        VariationOverview {
                            id: v.id,
                            sku: v.sku,
                            name: v.name,
                            price: v.price,
                            stock: v.stock,
                            min_stock: v.min_stock,
                            is_active: v.is_active,
                            alert,
                        }
                    })
                    .collect();
                ProductOverview {
                    id: p.id,
                    name: p.name,
                    slug: p.slug,
                    is_active: p.is_active,
                    variations,
                }
            })
            .collect();

        CategoryOverview {
            id: category.id,
            name: category.name,
            slug: category.slug,
            products,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::repositories::Repositories;

    fn service(repos: &Repositories) -> InventoryOverviewService {
        InventoryOverviewService::new(
            repos.categories.clone(),
            repos.products.clone(),
            repos.variations.clone(),
        )
    }

    async fn seed_category(repos: &Repositories, name: &str, sort_order: i32) -> category::Model {
        repos
            .categories
            .insert(category::Model {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: name.to_lowercase().replace(' ', "-"),
                description: None,
                sort_order,
                is_active: true,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn seed_product(
        repos: &Repositories,
        category_id: Uuid,
        name: &str,
    ) -> product::Model {
        let now = Utc::now();
        repos
            .products
            .insert(product::Model {
                id: Uuid::new_v4(),
                category_id,
                name: name.to_string(),
                slug: name.to_lowercase().replace(' ', "-"),
                description: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    async fn seed_variation(
        repos: &Repositories,
        product_id: Uuid,
        name: &str,
        stock: i32,
        min_stock: i32,
    ) -> product_variation::Model {
        let now = Utc::now();
        repos
            .variations
            .insert(product_variation::Model {
                id: Uuid::new_v4(),
                product_id,
                sku: format!("SKU-{}", Uuid::new_v4()),
                name: name.to_string(),
                price: dec!(9.9900),
                stock,
                min_stock,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_store_yields_empty_overview() {
        let repos = Repositories::in_memory();
        let overview = service(&repos).get_overview().await.unwrap();
        assert!(overview.is_empty());
    }

    #[tokio::test]
    async fn overview_nests_products_under_their_categories() {
        let repos = Repositories::in_memory();
        let drinks = seed_category(&repos, "Drinks", 1).await;
        let snacks = seed_category(&repos, "Snacks", 2).await;
        let tea = seed_product(&repos, drinks.id, "Tea").await;
        seed_product(&repos, snacks.id, "Chips").await;
        seed_variation(&repos, tea.id, "Green", 10, 2).await;
        seed_variation(&repos, tea.id, "Black", 4, 2).await;

        let overview = service(&repos).get_overview().await.unwrap();

        assert_eq!(overview.len(), 2);
        assert_eq!(overview[0].name, "Drinks");
        assert_eq!(overview[0].products.len(), 1);
        assert_eq!(overview[0].products[0].variations.len(), 2);
        assert_eq!(overview[1].name, "Snacks");
        assert_eq!(overview[1].products.len(), 1);
        assert!(overview[1].products[0].variations.is_empty());
    }

    #[tokio::test]
    async fn alert_is_inclusive_at_the_boundary() {
        let repos = Repositories::in_memory();
        let cat = seed_category(&repos, "Drinks", 1).await;
        let tea = seed_product(&repos, cat.id, "Tea").await;
        seed_variation(&repos, tea.id, "At minimum", 5, 5).await;
        seed_variation(&repos, tea.id, "Above", 6, 5).await;
        seed_variation(&repos, tea.id, "Below", 1, 5).await;

        let overview = service(&repos).get_overview().await.unwrap();
        let variations = &overview[0].products[0].variations;

        let by_name = |name: &str| {
            variations
                .iter()
                .find(|v| v.name == name)
                .unwrap_or_else(|| panic!("missing variation {name}"))
        };
        assert!(by_name("At minimum").alert);
        assert!(!by_name("Above").alert);
        assert!(by_name("Below").alert);
    }

    #[tokio::test]
    async fn low_stock_list_carries_product_names() {
        let repos = Repositories::in_memory();
        let cat = seed_category(&repos, "Drinks", 1).await;
        let tea = seed_product(&repos, cat.id, "Tea").await;
        seed_variation(&repos, tea.id, "Low", 1, 5).await;
        seed_variation(&repos, tea.id, "Fine", 9, 5).await;

        let low = service(&repos).low_stock_variations().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name, "Low");
        assert_eq!(low[0].product_name, "Tea");
    }
}
