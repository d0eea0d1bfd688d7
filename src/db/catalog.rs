//! Products, categories, category discounts, reviews and stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use super::{conflict_on_reference, conflict_on_unique, contains_pattern};
use crate::domain::aggregates::{InventoryChange, Product, ProductError, ProductRecord};
use crate::domain::events::DomainEvent;
use crate::models::{Category, CategorySummary, InventoryTransaction, Review};
use crate::pricing::CategoryDiscount;
use crate::{EcommerceError, Result};

/// Listing order for products.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductSort {
    #[default]
    Name,
    PriceLow,
    PriceHigh,
    Newest,
}

impl ProductSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Name => " ORDER BY p.name ASC, p.id ASC",
            Self::PriceLow => " ORDER BY e.effective_price ASC, p.name ASC",
            Self::PriceHigh => " ORDER BY e.effective_price DESC, p.name ASC",
            Self::Newest => " ORDER BY p.created_at DESC, p.id DESC",
        }
    }
}

/// Storefront price bands, on the discounted price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PriceRange {
    #[serde(rename = "under-500")]
    Under500,
    #[serde(rename = "500-1000")]
    From500To1000,
    #[serde(rename = "1000-1500")]
    From1000To1500,
    #[serde(rename = "over-1500")]
    Over1500,
}

impl PriceRange {
    /// Inclusive lower and exclusive upper bound.
    pub fn bounds(self) -> (Option<Decimal>, Option<Decimal>) {
        let (low, high) = match self {
            Self::Under500 => (None, Some(500)),
            Self::From500To1000 => (Some(500), Some(1000)),
            Self::From1000To1500 => (Some(1000), Some(1500)),
            Self::Over1500 => (Some(1500), None),
        };
        (low.map(Decimal::from), high.map(Decimal::from))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    /// Inclusive, compared with the discounted price.
    pub min_price: Option<Decimal>,
    /// Exclusive, compared with the discounted price.
    pub max_price: Option<Decimal>,
    pub sort: ProductSort,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub in_stock: Option<bool>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    pub weight: Option<f64>,
    pub dimensions: Option<serde_json::Value>,
}

impl ProductInput {
    pub fn check(&self) -> std::result::Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price < Decimal::ZERO { return Err(ProductError::NegativePrice); }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDiscountInput {
    pub category_id: Uuid,
    pub discount_percentage: Decimal,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool { true }

impl CategoryDiscountInput {
    pub fn check(&self) -> Result<()> {
        if self.discount_percentage <= Decimal::ZERO || self.discount_percentage > Decimal::ONE_HUNDRED {
            return Err(EcommerceError::Validation("discount_percentage must be greater than 0 and at most 100".into()));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if until < from {
                return Err(EcommerceError::Validation("valid_until must not precede valid_from".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Result of a stock movement, including the events it raised.
#[derive(Debug)]
pub struct StockMovement {
    pub transaction: InventoryTransaction,
    pub events: Vec<DomainEvent>,
}

/// Repository for catalog database operations.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// `FROM` and `WHERE` of a product listing. `e.effective_price` is the
    /// list price after the newest category discount in effect at `now`.
    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter, now: DateTime<Utc>) {
        builder
            .push(
                " FROM products p
                  LEFT JOIN categories c ON c.id = p.category_id
                  LEFT JOIN LATERAL (
                      SELECT d.discount_percentage FROM category_discounts d
                      WHERE d.category_id = p.category_id AND d.is_active
                        AND (d.valid_from IS NULL OR d.valid_from <= ",
            )
            .push_bind(now)
            .push(") AND (d.valid_until IS NULL OR d.valid_until >= ")
            .push_bind(now)
            .push(
                ")
                      ORDER BY d.created_at DESC LIMIT 1
                  ) d ON TRUE
                  CROSS JOIN LATERAL (
                      SELECT ROUND(p.price * (100 - COALESCE(d.discount_percentage, 0)) / 100, 2) AS effective_price
                  ) e
                  WHERE TRUE",
            );
        if let Some(category) = filter.category_id {
            builder.push(" AND p.category_id = ").push_bind(category);
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            builder
                .push(" AND (p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND e.effective_price >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND e.effective_price < ").push_bind(max);
        }
    }

    /// One page of products matching `filter`, and the total number of matches.
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<ProductRecord>, i64)> {
        let now = Utc::now();
        let mut builder = QueryBuilder::new("SELECT p.*");
        Self::push_filters(&mut builder, filter, now);
        builder.push(filter.sort.order_by());
        builder.push(" LIMIT ").push_bind(filter.limit);
        builder.push(" OFFSET ").push_bind(filter.offset);
        let products = builder.build_query_as::<ProductRecord>().fetch_all(self.pool).await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*)");
        Self::push_filters(&mut count, filter, now);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(self.pool).await?;
        Ok((products, total))
    }

    pub async fn get_product(&self, id: Uuid) -> Result<ProductRecord> {
        sqlx::query_as::<_, ProductRecord>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::ProductNotFound)
    }

    /// Up to `limit` other products from the same category.
    pub async fn related_products(&self, product: &ProductRecord, limit: i64) -> Result<Vec<ProductRecord>> {
        let Some(category) = product.category_id else { return Ok(vec![]) };
        Ok(sqlx::query_as::<_, ProductRecord>(
            "SELECT * FROM products WHERE category_id = $1 AND id <> $2 ORDER BY created_at DESC LIMIT $3",
        )
        .bind(category)
        .bind(product.id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn create_product(&self, input: &ProductInput) -> Result<ProductRecord> {
        sqlx::query_as::<_, ProductRecord>(
            "INSERT INTO products (id, category_id, sku, name, description, price, image_url, in_stock, stock_quantity, weight, dimensions)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(input.category_id)
        .bind(&input.sku)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.image_url)
        .bind(input.in_stock.unwrap_or(true))
        .bind(input.stock_quantity.unwrap_or(0))
        .bind(input.weight)
        .bind(&input.dimensions)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Product SKU"))
    }

    /// Edit a product's details. `stock_quantity` is ignored here; stock only
    /// moves through `adjust_stock` and checkout so every change is ledgered.
    pub async fn update_product(&self, id: Uuid, input: &ProductInput) -> Result<ProductRecord> {
        sqlx::query_as::<_, ProductRecord>(
            "UPDATE products SET category_id = $2, sku = $3, name = $4, description = $5, price = $6, image_url = $7,
                    in_stock = COALESCE($8, in_stock), weight = $9, dimensions = $10, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(input.category_id)
        .bind(&input.sku)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.image_url)
        .bind(input.in_stock)
        .bind(input.weight)
        .bind(&input.dimensions)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Product SKU"))?
        .ok_or(EcommerceError::ProductNotFound)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| conflict_on_reference(e, "Product has orders and cannot be deleted; mark it out of stock instead"))?;
        if result.rows_affected() == 0 { return Err(EcommerceError::ProductNotFound); }
        Ok(())
    }

    /// Lock a product row for the rest of the transaction.
    pub async fn lock_product(conn: &mut PgConnection, id: Uuid) -> Result<ProductRecord> {
        sqlx::query_as::<_, ProductRecord>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(EcommerceError::ProductNotFound)
    }

    /// Persist a stock change made on the aggregate and append it to the ledger.
    pub async fn record_stock(
        conn: &mut PgConnection,
        product: &mut Product,
        change: i32,
        kind: InventoryChange,
        reference: Option<(&str, Uuid)>,
        notes: Option<&str>,
        actor: Option<Uuid>,
    ) -> Result<StockMovement> {
        sqlx::query("UPDATE products SET stock_quantity = $2, in_stock = $3, updated_at = NOW() WHERE id = $1")
            .bind(product.id())
            .bind(product.stock_quantity())
            .bind(product.in_stock())
            .execute(&mut *conn)
            .await?;
        let transaction = sqlx::query_as::<_, InventoryTransaction>(
            "INSERT INTO inventory_transactions (id, product_id, type, quantity_change, quantity_after, reference_type, reference_id, notes, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product.id())
        .bind(kind.as_str())
        .bind(change)
        .bind(product.stock_quantity())
        .bind(reference.map(|(ref_type, _)| ref_type))
        .bind(reference.map(|(_, id)| id))
        .bind(notes)
        .bind(actor)
        .fetch_one(&mut *conn)
        .await?;
        Ok(StockMovement { transaction, events: product.take_events() })
    }

    /// Manual stock adjustment from the back office.
    pub async fn adjust_stock(&self, id: Uuid, change: i32, notes: Option<&str>, actor: Uuid) -> Result<StockMovement> {
        let mut tx = self.pool.begin().await?;
        let record = Self::lock_product(&mut *tx, id).await?;
        let mut product = Product::from(&record);
        product.adjust(change)?;
        let kind = if change > 0 { InventoryChange::Restock } else { InventoryChange::Adjustment };
        let movement = Self::record_stock(&mut *tx, &mut product, change, kind, None, notes, Some(actor)).await?;
        tx.commit().await?;
        Ok(movement)
    }

    /// Categories by name, each with the number of products filed under it.
    pub async fn list_categories(&self) -> Result<Vec<CategorySummary>> {
        Ok(sqlx::query_as::<_, CategorySummary>(
            "SELECT c.*, (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count
             FROM categories c ORDER BY c.name",
        )
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::CategoryNotFound)
    }

    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, description, image_url) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.image_url)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category"))
    }

    pub async fn update_category(&self, id: Uuid, input: &CategoryInput) -> Result<Category> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2, description = $3, image_url = $4, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.image_url)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Category"))?
        .ok_or(EcommerceError::CategoryNotFound)
    }

    /// Delete a category. Its products become uncategorised and its
    /// discounts go with it.
    ///
    /// # Errors
    ///
    /// `Conflict` while any coupon is scoped to the category.
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| conflict_on_reference(e, "Category has coupons scoped to it; delete or rescope them first"))?;
        if result.rows_affected() == 0 { return Err(EcommerceError::CategoryNotFound); }
        Ok(())
    }

    /// All category discounts, newest first.
    pub async fn list_category_discounts(&self) -> Result<Vec<CategoryDiscount>> {
        Ok(sqlx::query_as::<_, CategoryDiscount>("SELECT * FROM category_discounts ORDER BY created_at DESC")
            .fetch_all(self.pool)
            .await?)
    }

    /// Active discounts only; expiry is checked by the caller against its clock.
    pub async fn active_category_discounts(&self) -> Result<Vec<CategoryDiscount>> {
        Ok(sqlx::query_as::<_, CategoryDiscount>(
            "SELECT * FROM category_discounts WHERE is_active ORDER BY created_at DESC",
        )
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn create_category_discount(&self, input: &CategoryDiscountInput) -> Result<CategoryDiscount> {
        input.check()?;
        self.get_category(input.category_id).await?;
        Ok(sqlx::query_as::<_, CategoryDiscount>(
            "INSERT INTO category_discounts (id, category_id, discount_percentage, is_active, valid_from, valid_until)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(input.category_id)
        .bind(input.discount_percentage)
        .bind(input.is_active)
        .bind(input.valid_from)
        .bind(input.valid_until)
        .fetch_one(self.pool)
        .await?)
    }

    pub async fn delete_category_discount(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM category_discounts WHERE id = $1").bind(id).execute(self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::CategoryDiscountNotFound); }
        Ok(())
    }

    pub async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        Ok(sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(self.pool)
            .await?)
    }

    pub async fn create_review(&self, product_id: Uuid, user_id: Uuid, input: &ReviewInput) -> Result<Review> {
        self.get_product(product_id).await?;
        Ok(sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (id, product_id, user_id, rating, comment) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product_id)
        .bind(user_id)
        .bind(input.rating)
        .bind(input.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .fetch_one(self.pool)
        .await?)
    }
}
