//! Storefront API Library
//!
//! Catalog management, checkout, payment notifications, and stock-ledger
//! inventory accounting for a small storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    /// Live connection when running against a database. `None` means the
    /// repositories are in-memory (tests, local demos) and there is nothing
    /// to health-check.
    pub db: Option<Arc<DatabaseConnection>>,
    pub event_sender: Arc<events::EventSender>,
    pub services: services::factory::AppServices,
}

impl AppState {
    pub fn new(
        config: Arc<config::AppConfig>,
        db: Option<Arc<DatabaseConnection>>,
        event_sender: Arc<events::EventSender>,
        services: services::factory::AppServices,
    ) -> Self {
        Self {
            config,
            db,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: middleware_helpers::request_id::current_request_id()
                .map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, errors::ServiceError>;

/// Versioned API surface.
///
/// Health endpoints ride along at the version root so load balancers probe
/// the same prefix the clients use.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::health::health_routes())
        // Catalog
        .nest("/categories", handlers::catalog::categories_routes())
        .nest("/products", handlers::catalog::products_routes())
        .nest(
            "/variations",
            handlers::catalog::variations_routes().merge(handlers::inventory::adjustment_routes()),
        )
        // Inventory read side
        .nest("/inventory", handlers::inventory::inventory_routes())
        // Checkout and orders
        .nest("/checkout", handlers::orders::checkout_routes())
        .nest("/orders", handlers::orders::orders_routes())
        // Payment gateway callbacks
        .nest("/payments", handlers::payments::payments_routes())
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use crate::middleware_helpers::request_id::{scope_request_id, RequestId};
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response = scope_request_id(RequestId::new("meta-123"), async {
            ApiResponse::success("ok")
        })
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response = scope_request_id(RequestId::new("meta-err"), async {
            ApiResponse::<()>::error("oops".into())
        })
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_response_includes_metadata() {
        let response = scope_request_id(RequestId::new("meta-validation"), async {
            ApiResponse::<()>::validation_errors(vec!["missing".into()])
        })
        .await;

        assert_eq!(response.errors.as_deref(), Some(&["missing".to_string()][..]));
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
    }
}
