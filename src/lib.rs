//! Furnish Storefront
//!
//! Furniture e-commerce backend: catalog browsing, session carts, coupons,
//! checkout and the admin back office.
//!
//! ## Features
//! - Product catalog with time-boxed category discounts
//! - Session cart with live pricing quotes
//! - Coupon evaluation (percentage or fixed amount, caps, minimums, usage limits)
//! - Checkout with stock reservation and order tracking
//! - Back office for categories, coupons, products, orders and users

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

pub mod checkout;
pub mod config;
pub mod db;
pub mod domain;
pub mod http;
pub mod messaging;
pub mod models;
pub mod pricing;

pub use config::AppConfig;
pub use domain::aggregates::coupon::CouponRejection;
pub use domain::aggregates::order::OrderError;
pub use domain::aggregates::product::ProductError;
pub use http::{router, AppState};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Category discount not found")]
    CategoryDiscountNotFound,

    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Address not found")]
    AddressNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient inventory for {0}")]
    InsufficientInventory(String),

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error(transparent)]
    CouponRejected(#[from] CouponRejection),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] sqlx::Error),
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

impl From<ProductError> for EcommerceError {
    fn from(error: ProductError) -> Self {
        match error {
            ProductError::InsufficientInventory { name, .. } => Self::InsufficientInventory(name),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl EcommerceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ProductNotFound
            | Self::CategoryNotFound
            | Self::CategoryDiscountNotFound
            | Self::CouponNotFound
            | Self::OrderNotFound
            | Self::AddressNotFound
            | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::EmptyCart | Self::InvalidQuantity | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientInventory(_) | Self::Conflict(_) | Self::Order(_) => StatusCode::CONFLICT,
            Self::CouponRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage details stay in the logs.
        let message = if let Self::StorageError(err) = &self {
            tracing::error!(error = %err, "storage error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        assert_eq!(EcommerceError::ProductNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(EcommerceError::EmptyCart.status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::Forbidden.status(), StatusCode::FORBIDDEN);
        let rejected = EcommerceError::from(CouponRejection::MinimumNotMet { minimum: Decimal::new(100, 0) });
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(rejected.to_string(), "This coupon requires a minimum order of $100.00");
    }

    #[test]
    fn test_storage_error_is_masked() {
        let response = EcommerceError::StorageError(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_insufficient_inventory_from_product_error() {
        let err = EcommerceError::from(ProductError::InsufficientInventory { name: "Oak Bench".into(), available: 1 });
        assert!(matches!(err, EcommerceError::InsufficientInventory(ref n) if n == "Oak Bench"));
    }
}
