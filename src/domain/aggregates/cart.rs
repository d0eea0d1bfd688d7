//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::coupon::{Coupon, CouponRejection};
use crate::pricing::{OrderTotals, PricingPolicy};

/// One priced line of a session cart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub quantity: u32,
    /// Catalog price before any category discount.
    pub list_price: Decimal,
    /// Price charged per unit.
    pub unit_price: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity) }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Cart {
    session_id: String,
    lines: Vec<CartLine>,
}

/// Coupon outcome attached to a quote.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AppliedCoupon {
    Applied { code: String, discount: Decimal },
    Rejected { code: String, reason: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct CartQuote {
    pub session_id: String,
    pub lines: Vec<CartLine>,
    pub item_count: u32,
    pub totals: OrderTotals,
    pub amount_until_free_shipping: Decimal,
    pub coupon: Option<AppliedCoupon>,
}

impl Cart {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), lines: vec![] }
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Total number of units, not lines.
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }

    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id) {
            existing.quantity += line.quantity;
        } else {
            self.lines.push(line);
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Subtotal of the lines in `category`, or the whole cart when `None`.
    pub fn eligible_subtotal(&self, category: Option<Uuid>) -> Decimal {
        match category {
            None => self.subtotal(),
            Some(c) => self.lines.iter().filter(|l| l.category_id == Some(c)).map(CartLine::line_total).sum(),
        }
    }

    /// Discount a coupon would grant on this cart.
    pub fn coupon_discount(&self, coupon: &Coupon, now: DateTime<Utc>) -> Result<Decimal, CouponRejection> {
        coupon.evaluate(self.subtotal(), self.eligible_subtotal(coupon.category_id), now)
    }

    /// Price the cart. A rejected coupon is reported, not fatal.
    pub fn quote(&self, coupon: Option<&Coupon>, policy: &PricingPolicy, now: DateTime<Utc>) -> CartQuote {
        let subtotal = self.subtotal();
        let (discount, applied) = match coupon {
            None => (Decimal::ZERO, None),
            Some(c) => match self.coupon_discount(c, now) {
                Ok(d) => (d, Some(AppliedCoupon::Applied { code: c.code.to_string(), discount: d })),
                Err(reason) => (
                    Decimal::ZERO,
                    Some(AppliedCoupon::Rejected { code: c.code.to_string(), reason: reason.to_string() }),
                ),
            },
        };
        let totals = policy.totals(subtotal, discount);
        CartQuote {
            session_id: self.session_id.clone(),
            lines: self.lines.clone(),
            item_count: self.item_count(),
            amount_until_free_shipping: policy.amount_until_free_shipping(totals.subtotal),
            totals,
            coupon: applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::coupon::DiscountType;
    use crate::domain::value_objects::CouponCode;

    fn line(product: Uuid, category: Option<Uuid>, qty: u32, price: i64) -> CartLine {
        CartLine {
            product_id: product, name: "Armchair".into(), category_id: category, image_url: None,
            quantity: qty, list_price: Decimal::new(price, 0), unit_price: Decimal::new(price, 0),
        }
    }

    fn coupon(category: Option<Uuid>) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::new_v4(), code: CouponCode::parse("FURNITURE15").unwrap(), name: "15 off".into(),
            description: None, discount_type: DiscountType::Percentage, discount_value: Decimal::new(15, 0),
            category_id: category, is_active: true, max_discount_amount: None, min_order_amount: None,
            usage_limit: None, used_count: 0, valid_from: None, valid_until: None, created_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_cart_operations() {
        let p1 = Uuid::new_v4();
        let mut cart = Cart::new("sess-1");
        cart.add_line(line(p1, None, 2, 10));
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.subtotal(), Decimal::new(20, 0));
        cart.add_line(line(p1, None, 1, 10));
        assert_eq!(cart.lines()[0].quantity, 3); // Merged
        cart.add_line(line(Uuid::new_v4(), None, 2, 5));
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.subtotal(), Decimal::new(40, 0));
    }

    #[test]
    fn test_quote_with_coupon() {
        let mut cart = Cart::new("sess-2");
        cart.add_line(line(Uuid::new_v4(), None, 1, 1299));
        let quote = cart.quote(Some(&coupon(None)), &PricingPolicy::default(), Utc::now());
        assert_eq!(quote.totals.discount, Decimal::new(19485, 2));
        assert_eq!(quote.totals.shipping, Decimal::ZERO);
        assert_eq!(quote.amount_until_free_shipping, Decimal::ZERO);
        assert!(matches!(quote.coupon, Some(AppliedCoupon::Applied { .. })));
    }

    #[test]
    fn test_quote_with_rejected_coupon() {
        let mut c = coupon(None);
        c.is_active = false;
        let mut cart = Cart::new("sess-3");
        cart.add_line(line(Uuid::new_v4(), None, 1, 120));
        let quote = cart.quote(Some(&c), &PricingPolicy::default(), Utc::now());
        assert_eq!(quote.totals.discount, Decimal::ZERO);
        assert_eq!(quote.totals.shipping, Decimal::new(4999, 2));
        assert_eq!(quote.amount_until_free_shipping, Decimal::new(380, 0));
        assert!(matches!(quote.coupon, Some(AppliedCoupon::Rejected { .. })));
    }

    #[test]
    fn test_category_scoped_coupon_uses_category_lines() {
        let living = Uuid::new_v4();
        let mut cart = Cart::new("sess-4");
        cart.add_line(line(Uuid::new_v4(), Some(living), 1, 200));
        cart.add_line(line(Uuid::new_v4(), Some(Uuid::new_v4()), 1, 800));
        assert_eq!(cart.eligible_subtotal(Some(living)), Decimal::new(200, 0));
        assert_eq!(cart.coupon_discount(&coupon(Some(living)), Utc::now()).unwrap(), Decimal::new(30, 0));
        assert_eq!(
            cart.coupon_discount(&coupon(Some(Uuid::new_v4())), Utc::now()),
            Err(CouponRejection::NotApplicable)
        );
    }
}
