use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{category, product, product_variation};
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::services::catalog::{
    CreateCategoryInput, CreateProductInput, CreateVariationInput, UpdateVariationInput,
};
use crate::AppState;

pub fn categories_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/", post(create_category))
}

pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/", post(create_product))
        .route("/:id", get(get_product))
        .route("/:id", delete(deactivate_product))
        .route("/:id/variations", get(list_product_variations))
        .route("/:id/variations", post(create_variation))
}

pub fn variations_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_variation))
        .route("/:id", patch(update_variation))
        .route("/:id", delete(deactivate_variation))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<category::Model> for CategoryResponse {
    fn from(model: category::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            sort_order: model.sort_order,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            category_id: model.category_id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariationResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    #[schema(example = "12.50")]
    pub price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<product_variation::Model> for VariationResponse {
    fn from(model: product_variation::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            sku: model.sku,
            name: model.name,
            price: model.price,
            stock: model.stock,
            min_stock: model.min_stock,
            is_active: model.is_active,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductDetailResponse {
    pub product: ProductResponse,
    pub variations: Vec<VariationResponse>,
}

/// Variation payload for the nested product route; the product id comes
/// from the path.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateVariationRequest {
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "MIX-500")]
    pub sku: String,
    #[validate(length(min = 1, max = 120))]
    #[schema(example = "500g")]
    pub name: String,
    #[schema(example = "4.50")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub opening_stock: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListParams {
    /// Restrict to one category
    pub category_id: Option<Uuid>,
}

/// List categories
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses(
        (status = 200, description = "Categories retrieved", body = crate::ApiResponse<Vec<CategoryResponse>>)
    ),
    tag = "Categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    let categories: Vec<CategoryResponse> =
        categories.into_iter().map(CategoryResponse::from).collect();
    Ok(success_response(categories))
}

/// Create a category
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateCategoryInput,
    responses(
        (status = 201, description = "Category created", body = crate::ApiResponse<CategoryResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let category = state.services.catalog.create_category(payload).await?;
    Ok(created_response(CategoryResponse::from(category)))
}

/// List products, optionally narrowed to a category
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListParams),
    responses(
        (status = 200, description = "Products retrieved", body = crate::ApiResponse<Vec<ProductResponse>>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = match params.category_id {
        Some(category_id) => {
            state
                .services
                .catalog
                .products_by_category(category_id)
                .await?
        }
        None => state.services.catalog.list_products().await?,
    };
    let products: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(success_response(products))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state.services.catalog.create_product(payload).await?;
    Ok(created_response(ProductResponse::from(product)))
}

/// Get a product with its variations
#[utoipa::path(
    get,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductDetailResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (product, variations) = state.services.catalog.get_product(id).await?;
    Ok(success_response(ProductDetailResponse {
        product: ProductResponse::from(product),
        variations: variations.into_iter().map(VariationResponse::from).collect(),
    }))
}

/// Deactivate a product
#[utoipa::path(
    delete,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deactivated", body = crate::ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn deactivate_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.set_product_active(id, false).await?;
    Ok(success_response(ProductResponse::from(product)))
}

/// List a product's variations
#[utoipa::path(
    get,
    path = "/api/v1/products/:id/variations",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Variations retrieved", body = crate::ApiResponse<Vec<VariationResponse>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_product_variations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let (_, variations) = state.services.catalog.get_product(id).await?;
    let variations: Vec<VariationResponse> =
        variations.into_iter().map(VariationResponse::from).collect();
    Ok(success_response(variations))
}

/// Create a variation under a product
#[utoipa::path(
    post,
    path = "/api/v1/products/:id/variations",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateVariationRequest,
    responses(
        (status = 201, description = "Variation created", body = crate::ApiResponse<VariationResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_variation(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<CreateVariationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let variation = state
        .services
        .catalog
        .create_variation(CreateVariationInput {
            product_id,
            sku: payload.sku,
            name: payload.name,
            price: payload.price,
            opening_stock: payload.opening_stock,
            min_stock: payload.min_stock,
        })
        .await?;
    Ok(created_response(VariationResponse::from(variation)))
}

/// Get a variation
#[utoipa::path(
    get,
    path = "/api/v1/variations/:id",
    params(("id" = Uuid, Path, description = "Variation ID")),
    responses(
        (status = 200, description = "Variation retrieved", body = crate::ApiResponse<VariationResponse>),
        (status = 404, description = "Variation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Variations"
)]
pub async fn get_variation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let variation = state.services.catalog.get_variation(id).await?;
    Ok(success_response(VariationResponse::from(variation)))
}

/// Edit a variation's catalog fields (stock moves through /stock only)
#[utoipa::path(
    patch,
    path = "/api/v1/variations/:id",
    params(("id" = Uuid, Path, description = "Variation ID")),
    request_body = UpdateVariationInput,
    responses(
        (status = 200, description = "Variation updated", body = crate::ApiResponse<VariationResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Variations"
)]
pub async fn update_variation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVariationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let variation = state.services.catalog.update_variation(id, payload).await?;
    Ok(success_response(VariationResponse::from(variation)))
}

/// Deactivate a variation
#[utoipa::path(
    delete,
    path = "/api/v1/variations/:id",
    params(("id" = Uuid, Path, description = "Variation ID")),
    responses(
        (status = 200, description = "Variation deactivated", body = crate::ApiResponse<VariationResponse>),
        (status = 404, description = "Variation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Variations"
)]
pub async fn deactivate_variation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let variation = state
        .services
        .catalog
        .update_variation(
            id,
            UpdateVariationInput {
                name: None,
                price: None,
                min_stock: None,
                is_active: Some(false),
            },
        )
        .await?;
    Ok(success_response(VariationResponse::from(variation)))
}
