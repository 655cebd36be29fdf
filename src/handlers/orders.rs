use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{OrderStatus, PaymentStatus};
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::handlers::common::{
    created_response, success_response, validate_input, PaginatedResponse, PaginationParams,
};
use crate::services::orders::{CheckoutInput, PlacedOrder};
use crate::services::payments::PreferenceHandle;
use crate::AppState;

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/token/:token", get(get_order_by_token))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub token: String,
    pub customer_name: String,
    pub customer_email: String,
    pub payment_method: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference_id: Option<String>,
    #[schema(example = "25.00")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<order::Model> for OrderResponse {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            token: model.token,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            payment_method: model.payment_method,
            status: model.status,
            payment_status: model.payment_status,
            preference_id: model.preference_id,
            total: model.total,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<Uuid>,
    pub product_name: String,
    pub variation_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            variation_id: model.variation_id,
            product_name: model.product_name,
            variation_name: model.variation_name,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total: model.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

impl From<PlacedOrder> for OrderDetailResponse {
    fn from(placed: PlacedOrder) -> Self {
        Self {
            order: OrderResponse::from(placed.order),
            items: placed
                .items
                .into_iter()
                .map(OrderItemResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    pub payment: PreferenceHandle,
}

/// Place an order: price the items, discount stock, register the payment
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutInput,
    responses(
        (status = 201, description = "Order placed", body = crate::ApiResponse<CheckoutResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown variation", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let placed = state.services.orders.create_order(payload).await?;
    let payment = state
        .services
        .payments
        .create_preference(&placed.order, &placed.items)
        .await?;

    // The preference was attached after the order snapshot was taken.
    let mut order = OrderResponse::from(placed.order);
    order.preference_id = Some(payment.preference_id.clone());

    Ok(created_response(CheckoutResponse {
        order,
        items: placed
            .items
            .into_iter()
            .map(OrderItemResponse::from)
            .collect(),
        payment,
    }))
}

/// List orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved", body = crate::ApiResponse<PaginatedResponse<OrderResponse>>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.clamp(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    let (orders, total) = state.services.orders.list_orders(page, per_page).await?;
    let orders: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(
        orders, page, per_page, total,
    )))
}

/// Get an order by id
#[utoipa::path(
    get,
    path = "/api/v1/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = crate::ApiResponse<OrderDetailResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let placed = state.services.orders.get_order_by_id(id).await?;
    Ok(success_response(OrderDetailResponse::from(placed)))
}

/// Get an order by its public token
#[utoipa::path(
    get,
    path = "/api/v1/orders/token/:token",
    params(("token" = String, Path, description = "Order token")),
    responses(
        (status = 200, description = "Order retrieved", body = crate::ApiResponse<OrderDetailResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let placed = state.services.orders.get_order(&token).await?;
    Ok(success_response(OrderDetailResponse::from(placed)))
}
