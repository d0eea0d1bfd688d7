//! Session cart and coupon checks.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::db::{carts, CartRepository, CatalogRepository, CouponRepository};
use crate::domain::aggregates::{AppliedCoupon, Cart, CartQuote};
use crate::domain::value_objects::Quantity;
use crate::{CouponRejection, EcommerceError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart/:session", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/cart/:session/items/:product_id", put(update_item).delete(remove_item))
        .route("/coupons/validate", post(validate_coupon))
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    #[serde(flatten)]
    pub quote: CartQuote,
    pub currency: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteParams {
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 999))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 30))]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CouponCheck {
    pub valid: bool,
    pub code: String,
    pub discount: Decimal,
    pub message: String,
}

async fn load_cart(s: &AppState, session: &str) -> Result<Cart> {
    let rows = CartRepository::new(&s.db).rows(session).await?;
    let discounts = CatalogRepository::new(&s.db).active_category_discounts().await?;
    Ok(carts::build_cart(session, rows, &discounts, Utc::now()))
}

/// Price the cart, attaching the outcome of `coupon_code` when one is given.
async fn quote(s: &AppState, session: &str, coupon_code: Option<&str>) -> Result<QuoteResponse> {
    let cart = load_cart(s, session).await?;
    let now = Utc::now();
    let code = coupon_code.map(str::trim).filter(|c| !c.is_empty());
    let quote = match code {
        None => cart.quote(None, &s.pricing, now),
        Some(code) => match CouponRepository::new(&s.db).find_by_code(code).await {
            Ok(coupon) => cart.quote(Some(&coupon), &s.pricing, now),
            Err(EcommerceError::CouponNotFound) => {
                let mut quote = cart.quote(None, &s.pricing, now);
                quote.coupon = Some(AppliedCoupon::Rejected {
                    code: code.to_uppercase(),
                    reason: CouponRejection::Inactive.to_string(),
                });
                quote
            }
            Err(err) => return Err(err),
        },
    };
    Ok(QuoteResponse { quote, currency: s.currency.clone() })
}

async fn get_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Query(p): Query<QuoteParams>,
) -> Result<Json<QuoteResponse>> {
    Ok(Json(quote(&s, &session, p.coupon_code.as_deref()).await?))
}

async fn add_to_cart(
    State(s): State<AppState>,
    Path(session): Path<String>,
    Json(r): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<QuoteResponse>)> {
    r.validate().map_err(|_| EcommerceError::InvalidQuantity)?;
    let quantity = Quantity::new(r.quantity).map_err(|_| EcommerceError::InvalidQuantity)?;
    CartRepository::new(&s.db).add(&session, r.product_id, quantity).await?;
    tracing::debug!(%session, product_id = %r.product_id, quantity = r.quantity, "added to cart");
    Ok((StatusCode::CREATED, Json(quote(&s, &session, None).await?)))
}

async fn update_item(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
    Json(r): Json<UpdateQuantityRequest>,
) -> Result<Json<QuoteResponse>> {
    CartRepository::new(&s.db).set_quantity(&session, product_id, r.quantity).await?;
    Ok(Json(quote(&s, &session, None).await?))
}

async fn remove_item(
    State(s): State<AppState>,
    Path((session, product_id)): Path<(String, Uuid)>,
) -> Result<Json<QuoteResponse>> {
    CartRepository::new(&s.db).remove(&session, product_id).await?;
    Ok(Json(quote(&s, &session, None).await?))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode> {
    CartRepository::new(&s.db).clear(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Check a code against the current cart without applying it.
async fn validate_coupon(State(s): State<AppState>, Json(r): Json<ValidateCouponRequest>) -> Result<Json<CouponCheck>> {
    r.validate()?;
    let coupon = CouponRepository::new(&s.db).find_by_code(&r.code).await?;
    let cart = load_cart(&s, &r.session_id).await?;
    if cart.is_empty() {
        return Err(EcommerceError::EmptyCart);
    }
    let check = match cart.coupon_discount(&coupon, Utc::now()) {
        Ok(discount) => CouponCheck {
            valid: true,
            code: coupon.code.to_string(),
            discount,
            message: format!("Coupon applied: ${discount:.2} off"),
        },
        Err(reason) => CouponCheck { valid: false, code: coupon.code.to_string(), discount: Decimal::ZERO, message: reason.to_string() },
    };
    Ok(Json(check))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    use crate::http::test_support::{assert_error, send};

    fn json(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_rejects_zero_quantity() {
        let body = r#"{"product_id":"0190a3e4-7f3b-7cc2-9d1e-5a8f3c2b1a00","quantity":0}"#;
        let response = send(json("POST", "/api/v1/cart/sess-1", body)).await;
        let message = assert_error(response, StatusCode::BAD_REQUEST).await;
        assert_eq!(message, "Invalid quantity");
    }

    #[tokio::test]
    async fn test_add_rejects_oversized_quantity() {
        let body = r#"{"product_id":"0190a3e4-7f3b-7cc2-9d1e-5a8f3c2b1a00","quantity":5000}"#;
        let response = send(json("POST", "/api/v1/cart/sess-1", body)).await;
        assert_error(response, StatusCode::BAD_REQUEST).await;
    }

    #[tokio::test]
    async fn test_validate_coupon_requires_code() {
        let response = send(json("POST", "/api/v1/coupons/validate", r#"{"code":"","session_id":"sess-1"}"#)).await;
        assert_error(response, StatusCode::BAD_REQUEST).await;
    }
}
