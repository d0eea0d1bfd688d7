//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{CouponCode, UnknownVariant};
use crate::pricing::round_money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed_amount" => Ok(Self::FixedAmount),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub category_id: Option<Uuid>,
    pub is_active: bool,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a coupon cannot be applied to a cart.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("The coupon code you entered is not valid or has expired")]
    Inactive,
    #[error("This coupon code is not yet active")]
    NotYetValid,
    #[error("This coupon code has expired")]
    Expired,
    #[error("This coupon has reached its usage limit")]
    UsageLimitReached,
    #[error("This coupon requires a minimum order of ${minimum:.2}")]
    MinimumNotMet { minimum: Decimal },
    #[error("This coupon does not apply to any items in your cart")]
    NotApplicable,
}

/// Invalid coupon definition submitted from the back office.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponDefinitionError {
    #[error("percentage discounts must be greater than 0 and at most 100")]
    PercentageOutOfRange,
    #[error("fixed discounts must be greater than 0")]
    NonPositiveAmount,
    #[error("{0} cannot be negative")]
    Negative(&'static str),
    #[error("valid_until must not precede valid_from")]
    InvertedWindow,
}

// Zero caps, minimums and limits are treated as unset.
fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

impl Coupon {
    pub fn max_discount(&self) -> Option<Decimal> { positive(self.max_discount_amount) }
    pub fn min_order(&self) -> Option<Decimal> { positive(self.min_order_amount) }
    pub fn usage_cap(&self) -> Option<i32> { self.usage_limit.filter(|limit| *limit > 0) }

    /// Checks activity, validity window, usage and minimum order, in that order.
    pub fn check_eligibility(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return Err(CouponRejection::NotYetValid);
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(CouponRejection::Expired);
        }
        if self.usage_cap().is_some_and(|limit| self.used_count >= limit) {
            return Err(CouponRejection::UsageLimitReached);
        }
        if let Some(minimum) = self.min_order() {
            if subtotal < minimum {
                return Err(CouponRejection::MinimumNotMet { minimum });
            }
        }
        Ok(())
    }

    /// Discount this coupon grants.
    ///
    /// `subtotal` is the whole cart and drives the minimum-order check.
    /// `eligible_subtotal` is the part the discount is computed from: the
    /// whole cart, or only the lines of the coupon's category when it is
    /// category-scoped.
    pub fn evaluate(
        &self,
        subtotal: Decimal,
        eligible_subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, CouponRejection> {
        self.check_eligibility(subtotal, now)?;
        let base = eligible_subtotal.max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO));
        if self.category_id.is_some() && base.is_zero() {
            return Err(CouponRejection::NotApplicable);
        }
        let discount = match self.discount_type {
            DiscountType::Percentage => {
                let raw = base * self.discount_value / Decimal::ONE_HUNDRED;
                self.max_discount().map_or(raw, |cap| raw.min(cap))
            }
            DiscountType::FixedAmount => self.discount_value.min(base),
        };
        Ok(round_money(discount.max(Decimal::ZERO)))
    }

    pub fn validate_definition(&self) -> Result<(), CouponDefinitionError> {
        match self.discount_type {
            DiscountType::Percentage if self.discount_value <= Decimal::ZERO || self.discount_value > Decimal::ONE_HUNDRED => {
                return Err(CouponDefinitionError::PercentageOutOfRange);
            }
            DiscountType::FixedAmount if self.discount_value <= Decimal::ZERO => {
                return Err(CouponDefinitionError::NonPositiveAmount);
            }
            _ => {}
        }
        if self.max_discount_amount.is_some_and(|v| v < Decimal::ZERO) {
            return Err(CouponDefinitionError::Negative("max_discount_amount"));
        }
        if self.min_order_amount.is_some_and(|v| v < Decimal::ZERO) {
            return Err(CouponDefinitionError::Negative("min_order_amount"));
        }
        if self.usage_limit.is_some_and(|v| v < 0) {
            return Err(CouponDefinitionError::Negative("usage_limit"));
        }
        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until) {
            if until < from {
                return Err(CouponDefinitionError::InvertedWindow);
            }
        }
        Ok(())
    }
}

/// `coupons` table row.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CouponRecord {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub category_id: Option<Uuid>,
    pub is_active: bool,
    pub max_discount_amount: Option<Decimal>,
    pub min_order_amount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRecord> for Coupon {
    type Error = UnknownVariant;

    fn try_from(r: CouponRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            code: CouponCode::parse(&r.code).map_err(|_| UnknownVariant(r.code.clone()))?,
            name: r.name,
            description: r.description,
            discount_type: r.discount_type.parse()?,
            discount_value: r.discount_value,
            category_id: r.category_id,
            is_active: r.is_active,
            max_discount_amount: r.max_discount_amount,
            min_order_amount: r.min_order_amount,
            usage_limit: r.usage_limit,
            used_count: r.used_count,
            valid_from: r.valid_from,
            valid_until: r.valid_until,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dec(value: i64, scale: u32) -> Decimal { Decimal::new(value, scale) }

    fn coupon(discount_type: DiscountType, value: Decimal) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(), code: CouponCode::parse("SAVE10").unwrap(), name: "Save".into(), description: None,
            discount_type, discount_value: value, category_id: None, is_active: true,
            max_discount_amount: None, min_order_amount: None, usage_limit: None, used_count: 0,
            valid_from: Some(now - Duration::days(1)), valid_until: Some(now + Duration::days(30)),
            created_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let c = coupon(DiscountType::Percentage, dec(10, 0));
        assert_eq!(c.evaluate(dec(1299, 0), dec(1299, 0), Utc::now()).unwrap(), dec(12990, 2));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let mut c = coupon(DiscountType::Percentage, dec(20, 0));
        c.max_discount_amount = Some(dec(150, 0));
        assert_eq!(c.evaluate(dec(2000, 0), dec(2000, 0), Utc::now()).unwrap(), dec(150, 0));
        // zero cap means uncapped
        c.max_discount_amount = Some(Decimal::ZERO);
        assert_eq!(c.evaluate(dec(2000, 0), dec(2000, 0), Utc::now()).unwrap(), dec(400, 0));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_subtotal() {
        let c = coupon(DiscountType::FixedAmount, dec(100, 0));
        assert_eq!(c.evaluate(dec(60, 0), dec(60, 0), Utc::now()).unwrap(), dec(60, 0));
        assert_eq!(c.evaluate(dec(600, 0), dec(600, 0), Utc::now()).unwrap(), dec(100, 0));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Percentage, dec(10, 0));
        c.valid_from = Some(now + Duration::hours(1));
        assert_eq!(c.evaluate(dec(100, 0), dec(100, 0), now), Err(CouponRejection::NotYetValid));
        c.valid_from = None;
        c.valid_until = Some(now - Duration::seconds(1));
        assert_eq!(c.evaluate(dec(100, 0), dec(100, 0), now), Err(CouponRejection::Expired));
        c.valid_until = Some(now);
        assert!(c.evaluate(dec(100, 0), dec(100, 0), now).is_ok());
        c.valid_until = None;
        assert!(c.evaluate(dec(100, 0), dec(100, 0), now).is_ok());
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon(DiscountType::Percentage, dec(10, 0));
        c.usage_limit = Some(5);
        c.used_count = 5;
        assert_eq!(c.evaluate(dec(100, 0), dec(100, 0), Utc::now()), Err(CouponRejection::UsageLimitReached));
        c.used_count = 4;
        assert!(c.evaluate(dec(100, 0), dec(100, 0), Utc::now()).is_ok());
        c.usage_limit = Some(0);
        c.used_count = 40;
        assert!(c.evaluate(dec(100, 0), dec(100, 0), Utc::now()).is_ok());
    }

    #[test]
    fn test_minimum_order() {
        let mut c = coupon(DiscountType::FixedAmount, dec(50, 0));
        c.min_order_amount = Some(dec(300, 0));
        let err = c.evaluate(dec(29999, 2), dec(29999, 2), Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::MinimumNotMet { minimum: dec(300, 0) });
        assert_eq!(err.to_string(), "This coupon requires a minimum order of $300.00");
        assert_eq!(c.evaluate(dec(300, 0), dec(300, 0), Utc::now()).unwrap(), dec(50, 0));
    }

    #[test]
    fn test_check_order_window_before_usage() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Percentage, dec(10, 0));
        c.valid_until = Some(now - Duration::days(1));
        c.usage_limit = Some(1);
        c.used_count = 1;
        c.min_order_amount = Some(dec(1000, 0));
        assert_eq!(c.evaluate(dec(10, 0), dec(10, 0), now), Err(CouponRejection::Expired));
        c.is_active = false;
        assert_eq!(c.evaluate(dec(10, 0), dec(10, 0), now), Err(CouponRejection::Inactive));
    }

    #[test]
    fn test_category_scoped_coupon() {
        let mut c = coupon(DiscountType::Percentage, dec(15, 0));
        c.category_id = Some(Uuid::new_v4());
        assert_eq!(c.evaluate(dec(1000, 0), dec(400, 0), Utc::now()).unwrap(), dec(60, 0));
        assert_eq!(c.evaluate(dec(1000, 0), Decimal::ZERO, Utc::now()), Err(CouponRejection::NotApplicable));
    }

    #[test]
    fn test_definition_validation() {
        let mut c = coupon(DiscountType::Percentage, dec(120, 0));
        assert_eq!(c.validate_definition(), Err(CouponDefinitionError::PercentageOutOfRange));
        c.discount_value = dec(25, 0);
        assert!(c.validate_definition().is_ok());
        c.valid_until = Some(Utc::now() - Duration::days(10));
        assert_eq!(c.validate_definition(), Err(CouponDefinitionError::InvertedWindow));
        let mut f = coupon(DiscountType::FixedAmount, Decimal::ZERO);
        assert_eq!(f.validate_definition(), Err(CouponDefinitionError::NonPositiveAmount));
        f.discount_value = dec(20, 0);
        f.min_order_amount = Some(dec(-1, 0));
        assert_eq!(f.validate_definition(), Err(CouponDefinitionError::Negative("min_order_amount")));
    }

    #[test]
    fn test_record_conversion() {
        let now = Utc::now();
        let record = CouponRecord {
            id: Uuid::new_v4(), code: "WELCOME20".into(), name: "Welcome".into(), description: None,
            discount_type: "fixed_amount".into(), discount_value: dec(20, 0), category_id: None, is_active: true,
            max_discount_amount: None, min_order_amount: None, usage_limit: None, used_count: 0,
            valid_from: None, valid_until: None, created_at: now, updated_at: now,
        };
        let coupon = Coupon::try_from(record.clone()).unwrap();
        assert_eq!(coupon.discount_type, DiscountType::FixedAmount);
        assert!(Coupon::try_from(CouponRecord { discount_type: "bogo".into(), ..record }).is_err());
    }
}
