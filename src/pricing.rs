//! Shipping, tax and category discount arithmetic.
//!
//! Everything here is pure: callers pass the clock and the discounts they
//! loaded, and get decimal amounts rounded to cents back.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Round a money amount to cents, midpoint away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Shipping and tax rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(500, 0),
            flat_shipping: Decimal::new(4999, 2),
            tax_rate: Decimal::new(8, 2),
        }
    }
}

/// Breakdown of what the customer pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PricingPolicy {
    /// Shipping is waived once the (pre-discount) subtotal reaches the threshold.
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.flat_shipping
        }
    }

    pub fn amount_until_free_shipping(&self, subtotal: Decimal) -> Decimal {
        (self.free_shipping_threshold - subtotal).max(Decimal::ZERO)
    }

    /// Total = max(0, S - D) + shipping + tax, with tax levied on max(0, S - D).
    pub fn totals(&self, subtotal: Decimal, discount: Decimal) -> OrderTotals {
        let subtotal = round_money(subtotal.max(Decimal::ZERO));
        let discount = round_money(discount.max(Decimal::ZERO).min(subtotal));
        let taxable = (subtotal - discount).max(Decimal::ZERO);
        let shipping = self.shipping_for(subtotal);
        let tax = round_money(taxable * self.tax_rate);
        OrderTotals {
            subtotal,
            discount,
            shipping,
            tax,
            total: taxable + shipping + tax,
        }
    }
}

/// A percentage markdown on every product of one category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryDiscount {
    pub id: Uuid,
    pub category_id: Uuid,
    pub discount_percentage: Decimal,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CategoryDiscount {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.map_or(true, |from| from <= now)
            && self.valid_until.map_or(true, |until| now <= until)
    }

    pub fn apply(&self, price: Decimal) -> Decimal {
        let factor = Decimal::ONE - self.discount_percentage / Decimal::ONE_HUNDRED;
        round_money((price * factor).max(Decimal::ZERO))
    }
}

/// First effective discount for `category`; discounts within a category never stack.
pub fn effective_category_discount<'a>(
    discounts: &'a [CategoryDiscount],
    category: Option<Uuid>,
    now: DateTime<Utc>,
) -> Option<&'a CategoryDiscount> {
    let category = category?;
    discounts.iter().find(|d| d.category_id == category && d.is_effective(now))
}

/// Price charged for `list_price` once any category discount is applied.
pub fn discounted_price(
    list_price: Decimal,
    discounts: &[CategoryDiscount],
    category: Option<Uuid>,
    now: DateTime<Utc>,
) -> Decimal {
    effective_category_discount(discounts, category, now).map_or(list_price, |d| d.apply(list_price))
}
