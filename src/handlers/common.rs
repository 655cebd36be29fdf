use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServiceError;

/// Standard success response, wrapped in the API envelope
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(crate::ApiResponse::success(data))).into_response()
}

/// Standard created response, wrapped in the API envelope
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(crate::ApiResponse::success(data))).into_response()
}

/// Runs derive-level validation and folds the failures into one error.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Query-string pagination window.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationParams {
    /// Applies the configured bounds: page floors at 1, a zero page size
    /// falls back to the default, anything above the cap clamps down.
    pub fn clamp(&self, default_per_page: u32, max_per_page: u32) -> (u64, u64) {
        let page = self.page.max(1);
        let per_page = if self.per_page == 0 {
            default_per_page as u64
        } else {
            self.per_page.min(max_per_page as u64)
        };
        (page, per_page)
    }
}

/// Where a page sits within the full result set.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// A page of results together with its window metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: utoipa::ToSchema> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: utoipa::ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: u64, per_page: u64, total: u64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(page, per_page, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_meta_rounds_total_pages_up() {
        let meta = PaginationMeta::new(1, 20, 41);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(PaginationMeta::new(1, 20, 0).total_pages, 0);
    }

    #[test]
    fn clamp_applies_defaults_and_caps() {
        let params = PaginationParams { page: 0, per_page: 0 };
        assert_eq!(params.clamp(20, 100), (1, 20));

        let params = PaginationParams {
            page: 3,
            per_page: 500,
        };
        assert_eq!(params.clamp(20, 100), (3, 100));
    }
}
