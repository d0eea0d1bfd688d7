//! Fixtures for tests that run against `PostgreSQL`.
//!
//! These tests are `#[ignore]`d; run them with `cargo test -- --ignored`
//! and `DATABASE_URL` pointing at a scratch database.

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::catalog::{CategoryInput, ProductInput};
use super::coupons::CouponInput;
use super::{CartRepository, CatalogRepository, CouponRepository};
use crate::domain::aggregates::{Coupon, DiscountType, ProductRecord};
use crate::domain::value_objects::Quantity;
use crate::models::Category;

pub(crate) async fn pool() -> PgPool {
    let _ = dotenvy::dotenv();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must name a scratch database");
    let pool = PgPoolOptions::new().max_connections(8).connect(&url).await.expect("database reachable");
    super::migrate(&pool).await.expect("migrations apply");
    pool
}

/// A name no other test run will produce.
pub(crate) fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

pub(crate) async fn category(pool: &PgPool) -> Category {
    let input = CategoryInput { name: unique("Category"), description: None, image_url: None };
    CatalogRepository::new(pool).create_category(&input).await.unwrap()
}

pub(crate) async fn product(pool: &PgPool, name: &str, price: Decimal, category_id: Option<Uuid>, stock: i32) -> ProductRecord {
    let input = ProductInput {
        name: name.to_string(),
        description: None,
        sku: None,
        price,
        category_id,
        image_url: None,
        in_stock: Some(true),
        stock_quantity: Some(stock),
        weight: None,
        dimensions: None,
    };
    CatalogRepository::new(pool).create_product(&input).await.unwrap()
}

pub(crate) fn coupon_input(discount_type: DiscountType, value: Decimal) -> CouponInput {
    let code = format!("T{}", &Uuid::new_v4().simple().to_string()[..12]).to_uppercase();
    CouponInput {
        code,
        name: "Test coupon".into(),
        description: None,
        discount_type,
        discount_value: value,
        category_id: None,
        is_active: true,
        max_discount_amount: None,
        min_order_amount: None,
        usage_limit: None,
        valid_from: None,
        valid_until: None,
    }
}

pub(crate) async fn coupon(pool: &PgPool, input: CouponInput) -> Coupon {
    CouponRepository::new(pool).create(input).await.unwrap()
}

/// A fresh session holding `quantity` of `product_id`.
pub(crate) async fn cart_with(pool: &PgPool, product_id: Uuid, quantity: i64) -> String {
    let session = unique("sess");
    CartRepository::new(pool).add(&session, product_id, Quantity::new(quantity).unwrap()).await.unwrap();
    session
}

pub(crate) async fn stock_of(pool: &PgPool, product_id: Uuid) -> i32 {
    sqlx::query_scalar::<_, i32>("SELECT stock_quantity FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn ledger_rows(pool: &PgPool, product_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inventory_transactions WHERE product_id = $1")
        .bind(product_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub(crate) async fn orders_of(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
