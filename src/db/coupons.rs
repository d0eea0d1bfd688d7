//! Coupon definitions and redemption.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::conflict_on_unique;
use crate::domain::aggregates::{Coupon, CouponRecord, DiscountType};
use crate::domain::value_objects::CouponCode;
use crate::{CouponRejection, EcommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CouponInput {
    #[validate(length(min = 3, max = 30))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub category_id: Option<Uuid>,
    #[serde(default = "enabled")]
    pub is_active: bool,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

fn enabled() -> bool {
    true
}

impl CouponInput {
    /// Normalise the code and check the definition is coherent.
    pub fn into_coupon(self, id: Uuid, used_count: i32) -> Result<Coupon> {
        let code = CouponCode::parse(&self.code).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        let now = Utc::now();
        let coupon = Coupon {
            id,
            code,
            name: self.name.trim().to_string(),
            description: self.description,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            category_id: self.category_id,
            is_active: self.is_active,
            max_discount_amount: self.max_discount_amount,
            min_order_amount: self.min_order_amount,
            usage_limit: self.usage_limit,
            used_count,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            created_at: now,
            updated_at: now,
        };
        coupon.validate_definition().map_err(|e| EcommerceError::Validation(e.to_string()))?;
        Ok(coupon)
    }
}

fn into_domain(record: CouponRecord) -> Result<Coupon> {
    Coupon::try_from(record).map_err(|e| EcommerceError::Validation(format!("stored coupon has unknown value {}", e.0)))
}

pub struct CouponRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CouponRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Look a coupon up by code, case-insensitively.
    ///
    /// # Errors
    ///
    /// `CouponNotFound` when no coupon carries the code.
    pub async fn find_by_code(&self, code: &str) -> Result<Coupon> {
        let code = CouponCode::parse(code).map_err(|_| EcommerceError::CouponNotFound)?;
        let record = sqlx::query_as::<_, CouponRecord>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str())
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::CouponNotFound)?;
        into_domain(record)
    }

    pub async fn list(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, CouponRecord>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(into_domain)
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Coupon> {
        let record = sqlx::query_as::<_, CouponRecord>("SELECT * FROM coupons WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::CouponNotFound)?;
        into_domain(record)
    }

    pub async fn create(&self, input: CouponInput) -> Result<Coupon> {
        input.validate()?;
        let coupon = input.into_coupon(Uuid::now_v7(), 0)?;
        let record = sqlx::query_as::<_, CouponRecord>(
            "INSERT INTO coupons (id, code, name, description, discount_type, discount_value, category_id, is_active,
                                  max_discount_amount, min_order_amount, usage_limit, valid_from, valid_until)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
        )
        .bind(coupon.id)
        .bind(coupon.code.as_str())
        .bind(&coupon.name)
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.category_id)
        .bind(coupon.is_active)
        .bind(coupon.max_discount_amount)
        .bind(coupon.min_order_amount)
        .bind(coupon.usage_limit)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Coupon code"))?;
        into_domain(record)
    }

    /// Replace a coupon definition. Usage count is preserved.
    pub async fn update(&self, id: Uuid, input: CouponInput) -> Result<Coupon> {
        input.validate()?;
        let existing = self.get(id).await?;
        let coupon = input.into_coupon(id, existing.used_count)?;
        let record = sqlx::query_as::<_, CouponRecord>(
            "UPDATE coupons SET code = $2, name = $3, description = $4, discount_type = $5, discount_value = $6,
                    category_id = $7, is_active = $8, max_discount_amount = $9, min_order_amount = $10,
                    usage_limit = $11, valid_from = $12, valid_until = $13, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(coupon.code.as_str())
        .bind(&coupon.name)
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.category_id)
        .bind(coupon.is_active)
        .bind(coupon.max_discount_amount)
        .bind(coupon.min_order_amount)
        .bind(coupon.usage_limit)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Coupon code"))?
        .ok_or(EcommerceError::CouponNotFound)?;
        into_domain(record)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(EcommerceError::CouponNotFound);
        }
        Ok(())
    }

    /// Lock a coupon row for the rest of the transaction.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Coupon> {
        let record = sqlx::query_as::<_, CouponRecord>("SELECT * FROM coupons WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(EcommerceError::CouponNotFound)?;
        into_domain(record)
    }

    /// Count one use of a coupon, refusing to pass its usage limit.
    ///
    /// # Errors
    ///
    /// `CouponRejected(UsageLimitReached)` when the limit is already used up.
    pub async fn redeem(conn: &mut PgConnection, id: Uuid) -> Result<i32> {
        sqlx::query_scalar::<_, i32>(
            "UPDATE coupons SET used_count = used_count + 1, updated_at = NOW()
             WHERE id = $1 AND (usage_limit IS NULL OR usage_limit <= 0 OR used_count < usage_limit)
             RETURNING used_count",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(EcommerceError::CouponRejected(CouponRejection::UsageLimitReached))
    }
}
