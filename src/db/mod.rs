//! `PostgreSQL` persistence.
//!
//! # Tables
//!
//! - `products`, `categories`, `category_discounts`, `reviews` - catalog
//! - `inventory_transactions` - stock movement ledger
//! - `coupons` - discount codes
//! - `cart_items` - session carts
//! - `orders`, `order_items` - placed orders
//! - `profiles`, `user_roles`, `addresses` - accounts
//!
//! Migrations live in `migrations/` and run on startup.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::EcommerceError;

pub mod accounts;
pub mod carts;
pub mod catalog;
pub mod coupons;
pub mod orders;
#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::AccountRepository;
pub use carts::CartRepository;
pub use catalog::CatalogRepository;
pub use coupons::CouponRepository;
pub use orders::OrderRepository;

/// Create the connection pool.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
}

/// Apply embedded migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Map a unique-constraint violation to `Conflict`, anything else to storage.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> EcommerceError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if unique {
        EcommerceError::Conflict(format!("{what} already exists"))
    } else {
        EcommerceError::StorageError(err)
    }
}

/// Map a foreign-key violation to `Conflict(message)`, anything else to storage.
pub(crate) fn conflict_on_reference(err: sqlx::Error, message: &str) -> EcommerceError {
    let referenced = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503");
    if referenced {
        EcommerceError::Conflict(message.to_string())
    } else {
        EcommerceError::StorageError(err)
    }
}

/// `ILIKE` pattern matching `text` anywhere, with its own wildcards escaped.
pub(crate) fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Clamp pagination parameters: page ≥ 1, 1 ≤ per_page ≤ 100.
pub fn page_window(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    let offset = i64::from(page - 1) * i64::from(per_page);
    (page, per_page, offset)
}
