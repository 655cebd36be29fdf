use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::stock_movement::{self, MovementReason, MovementType};
use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::services::stock_accounting::AdjustStockInput;
use crate::AppState;

const DEFAULT_MOVEMENTS_LIMIT: u64 = 50;
const MAX_MOVEMENTS_LIMIT: u64 = 500;

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(get_overview))
        .route("/low-stock", get(get_low_stock))
        .route("/movements", get(list_movements))
}

/// Mounted under `/variations` next to the catalog routes.
pub fn adjustment_routes() -> Router<AppState> {
    Router::new().route("/:id/stock", post(adjust_variation_stock))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovementResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variation_id: Uuid,
    pub movement_type: MovementType,
    pub reason: MovementReason,
    pub quantity: i32,
    pub previous_stock: i32,
    pub new_stock: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<stock_movement::Model> for MovementResponse {
    fn from(model: stock_movement::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            variation_id: model.variation_id,
            movement_type: model.movement_type,
            reason: model.reason,
            quantity: model.quantity,
            previous_stock: model.previous_stock,
            new_stock: model.new_stock,
            order_token: model.order_token,
            note: model.note,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    pub movement_type: MovementType,
    #[validate(range(min = 1))]
    #[schema(example = 5)]
    pub quantity: i32,
    /// Defaults to MANUAL; SALE is reserved for order accounting.
    pub reason: Option<MovementReason>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementListParams {
    /// All movements of one order, oldest first
    pub order_token: Option<String>,
    /// Movements of one product, newest first
    pub product_id: Option<Uuid>,
    /// Row cap for product and recent listings
    pub limit: Option<u64>,
}

/// Full category -> product -> variation tree with live stock and alerts
#[utoipa::path(
    get,
    path = "/api/v1/inventory/overview",
    responses(
        (status = 200, description = "Overview retrieved", body = crate::ApiResponse<Vec<crate::services::inventory_overview::CategoryOverview>>)
    ),
    tag = "Inventory"
)]
pub async fn get_overview(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let overview = state.services.inventory.get_overview().await?;
    Ok(success_response(overview))
}

/// Active variations at or below their minimum stock
#[utoipa::path(
    get,
    path = "/api/v1/inventory/low-stock",
    responses(
        (status = 200, description = "Low stock list retrieved", body = crate::ApiResponse<Vec<crate::services::inventory_overview::LowStockVariation>>)
    ),
    tag = "Inventory"
)]
pub async fn get_low_stock(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let low = state.services.inventory.low_stock_variations().await?;
    Ok(success_response(low))
}

/// Ledger listing, filtered by order token or product
#[utoipa::path(
    get,
    path = "/api/v1/inventory/movements",
    params(MovementListParams),
    responses(
        (status = 200, description = "Movements retrieved", body = crate::ApiResponse<Vec<MovementResponse>>),
        (status = 400, description = "Conflicting filters", body = crate::errors::ErrorResponse)
    ),
    tag = "Inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<MovementListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_MOVEMENTS_LIMIT)
        .min(MAX_MOVEMENTS_LIMIT);

    let movements = match (params.order_token, params.product_id) {
        (Some(_), Some(_)) => {
            return Err(ServiceError::InvalidInput(
                "order_token and product_id are mutually exclusive".to_string(),
            ))
        }
        (Some(token), None) => state.services.movements.movements_for_order(&token).await?,
        (None, Some(product_id)) => {
            state
                .services
                .movements
                .movements_for_product(product_id, limit)
                .await?
        }
        (None, None) => state.services.movements.recent_movements(limit).await?,
    };

    let movements: Vec<MovementResponse> =
        movements.into_iter().map(MovementResponse::from).collect();
    Ok(success_response(movements))
}

/// Manually adjust a variation's stock
#[utoipa::path(
    post,
    path = "/api/v1/variations/:id/stock",
    params(("id" = Uuid, Path, description = "Variation ID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 201, description = "Adjustment recorded", body = crate::ApiResponse<MovementResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variation not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Inventory"
)]
pub async fn adjust_variation_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let movement = state
        .services
        .accounting
        .adjust_stock(AdjustStockInput {
            variation_id: id,
            movement_type: payload.movement_type,
            quantity: payload.quantity,
            reason: payload.reason,
            note: payload.note,
        })
        .await?;
    Ok(created_response(MovementResponse::from(movement)))
}
