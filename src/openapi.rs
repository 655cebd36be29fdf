use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Backend for a small storefront: catalog management, checkout, payment
notifications, and stock-ledger inventory accounting.

## Features

- **Catalog**: Categories, products, and sellable variations with slugs and SKUs
- **Checkout**: Order intake that validates and discounts stock atomically per line
- **Stock Ledger**: Every stock change recorded as an immutable movement
- **Inventory Overview**: Category tree with per-variation stock and low-stock alerts
- **Payments**: Sandbox payment preferences and HMAC-verified webhooks

## Authentication

The storefront endpoints are public. The payment webhook is authenticated by
an HMAC-SHA256 signature over `"{timestamp}.{body}"` carried in the
`x-timestamp` and `x-signature` headers.

## Error Handling

Errors use a consistent envelope with appropriate HTTP status codes:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock for variation 0bd7f0e4-41f3-43a5-9e1a-3ce611968d71. Available: 2, Requested: 5",
  "request_id": "3f2a6c1e-8d4b-4f0a-9c2d-1b5e7a9c0d42"
}
```

## Pagination

The order listing supports `page` and `per_page` query parameters.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Categories", description = "Catalog category endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Variations", description = "Sellable variation and stock adjustment endpoints"),
        (name = "Inventory", description = "Stock overview, alerts, and movement history"),
        (name = "Orders", description = "Checkout and order tracking endpoints"),
        (name = "Payments", description = "Payment webhook endpoints")
    ),
    paths(
        // Catalog
        crate::handlers::catalog::list_categories,
        crate::handlers::catalog::create_category,
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::create_product,
        crate::handlers::catalog::get_product,
        crate::handlers::catalog::deactivate_product,
        crate::handlers::catalog::list_product_variations,
        crate::handlers::catalog::create_variation,
        crate::handlers::catalog::get_variation,
        crate::handlers::catalog::update_variation,
        crate::handlers::catalog::deactivate_variation,

        // Inventory
        crate::handlers::inventory::get_overview,
        crate::handlers::inventory::get_low_stock,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::adjust_variation_stock,

        // Orders
        crate::handlers::orders::checkout,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_token,

        // Payments
        crate::handlers::payments::payment_webhook,

        // Health intentionally omitted from OpenAPI paths
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::handlers::common::PaginationMeta,
            crate::handlers::common::PaginatedResponse<crate::handlers::orders::OrderResponse>,

            // Catalog types
            crate::handlers::catalog::CategoryResponse,
            crate::handlers::catalog::ProductResponse,
            crate::handlers::catalog::ProductDetailResponse,
            crate::handlers::catalog::VariationResponse,
            crate::handlers::catalog::CreateVariationRequest,
            crate::services::catalog::CreateCategoryInput,
            crate::services::catalog::CreateProductInput,
            crate::services::catalog::UpdateVariationInput,

            // Inventory types
            crate::handlers::inventory::MovementResponse,
            crate::handlers::inventory::AdjustStockRequest,
            crate::services::inventory_overview::CategoryOverview,
            crate::services::inventory_overview::ProductOverview,
            crate::services::inventory_overview::VariationOverview,
            crate::services::inventory_overview::LowStockVariation,
            crate::entities::stock_movement::MovementType,
            crate::entities::stock_movement::MovementReason,

            // Order types
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,
            crate::handlers::orders::OrderDetailResponse,
            crate::handlers::orders::CheckoutResponse,
            crate::services::orders::CheckoutInput,
            crate::services::orders::CheckoutItem,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,

            // Payment types
            crate::services::payments::PreferenceHandle,
            crate::services::payments::PaymentNotification,
            crate::handlers::payments::WebhookAck,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
