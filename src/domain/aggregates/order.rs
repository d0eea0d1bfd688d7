//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartLine;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::UnknownVariant;
use crate::pricing::OrderTotals;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded, PartiallyRefunded }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Delivered, Refunded)
                | (Pending | Confirmed | Processing | Shipped, Cancelled)
        )
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "processing" => Self::Processing,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            other => return Err(UnknownVariant(other.to_string())),
        })
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "paid" => Self::Paid,
            "failed" => Self::Failed,
            "refunded" => Self::Refunded,
            "partially_refunded" => Self::PartiallyRefunded,
            other => return Err(UnknownVariant(other.to_string())),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub quantity: u32, pub unit_price: Decimal, pub total: Decimal }

#[derive(Clone, Debug)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: OrderStatus,
    payment: PaymentStatus,
    items: Vec<LineItem>,
    totals: OrderTotals,
    coupon_id: Option<Uuid>,
    coupon_code: Option<String>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

impl Order {
    /// Build a pending order from priced cart lines.
    pub fn place(
        order_number: impl Into<String>,
        user_id: Uuid,
        lines: &[CartLine],
        totals: OrderTotals,
        coupon: Option<(Uuid, String)>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let items = lines
            .iter()
            .map(|l| LineItem { product_id: l.product_id, name: l.name.clone(), quantity: l.quantity, unit_price: l.unit_price, total: l.line_total() })
            .collect();
        let (coupon_id, coupon_code) = coupon.map_or((None, None), |(id, code)| (Some(id), Some(code)));
        let mut order = Self {
            id: Uuid::now_v7(), order_number: order_number.into(), user_id,
            status: OrderStatus::Pending, payment: PaymentStatus::Pending,
            items, totals, coupon_id, coupon_code,
            tracking_number: None, carrier: None, shipped_at: None, delivered_at: None,
            updated_at: Utc::now(), events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.clone(), user_id, total: totals.total,
        }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment }
    pub fn totals(&self) -> &OrderTotals { &self.totals }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn coupon_id(&self) -> Option<Uuid> { self.coupon_id }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> { self.shipped_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn carrier(&self) -> Option<&str> { self.carrier.as_deref() }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn set_tracking(&mut self, carrier: Option<String>, tracking_number: Option<String>) {
        self.carrier = carrier;
        self.tracking_number = tracking_number;
        self.touch();
    }

    pub fn set_payment_status(&mut self, payment: PaymentStatus) { self.payment = payment; self.touch(); }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        self.touch();
        match next {
            OrderStatus::Shipped => {
                self.shipped_at = Some(self.updated_at);
                self.raise_event(DomainEvent::Order(OrderEvent::Shipped {
                    order_id: self.id, carrier: self.carrier.clone(), tracking: self.tracking_number.clone(),
                }));
            }
            OrderStatus::Delivered => {
                self.delivered_at = Some(self.updated_at);
                self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id }));
            }
            OrderStatus::Cancelled => self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id })),
            _ => {}
        }
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id, from: from.as_str().to_string(), to: next.as_str().to_string(),
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// `orders` table row.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderRecord {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: String,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub shipping_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub shipping_address_id: Option<Uuid>,
    pub billing_address_id: Option<Uuid>,
    pub notes: Option<String>,
    pub admin_notes: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<&OrderRecord> for Order {
    type Error = UnknownVariant;

    fn try_from(r: &OrderRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            order_number: r.order_number.clone(),
            user_id: r.user_id,
            status: r.status.parse()?,
            payment: r.payment_status.parse()?,
            items: vec![],
            totals: OrderTotals {
                subtotal: r.subtotal, discount: r.discount_amount, shipping: r.shipping_amount,
                tax: r.tax_amount, total: r.total_amount,
            },
            coupon_id: r.coupon_id,
            coupon_code: r.coupon_code.clone(),
            tracking_number: r.tracking_number.clone(),
            carrier: r.carrier.clone(),
            shipped_at: r.shipped_at,
            delivered_at: r.delivered_at,
            updated_at: r.updated_at,
            events: vec![],
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order has no items")]
    NoItems,
    #[error("Cannot move order from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<CartLine> {
        vec![CartLine {
            product_id: Uuid::new_v4(), name: "Walnut Dining Table Set".into(), category_id: None, image_url: None,
            quantity: 2, list_price: Decimal::new(899, 0), unit_price: Decimal::new(899, 0),
        }]
    }

    fn totals() -> OrderTotals {
        crate::pricing::PricingPolicy::default().totals(Decimal::new(1798, 0), Decimal::ZERO)
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::place("ORD-00001001", Uuid::new_v4(), &lines(), totals(), None).unwrap();
        assert_eq!(order.items()[0].total, Decimal::new(1798, 0));
        assert_eq!(order.take_events().len(), 1);
        order.transition_to(OrderStatus::Confirmed).unwrap();
        order.transition_to(OrderStatus::Processing).unwrap();
        order.set_tracking(Some("DHL".into()), Some("1Z999".into()));
        order.transition_to(OrderStatus::Shipped).unwrap();
        assert!(order.shipped_at().is_some());
        order.transition_to(OrderStatus::Delivered).unwrap();
        assert!(order.delivered_at().is_some());
        assert_eq!(order.status(), OrderStatus::Delivered);
        let subjects: Vec<_> = order.take_events().iter().map(DomainEvent::subject).collect();
        assert!(subjects.contains(&"ecommerce.order.shipped"));
        assert!(subjects.contains(&"ecommerce.order.delivered"));
    }

    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(Order::place("ORD-1", Uuid::new_v4(), &[], totals(), None).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut order = Order::place("ORD-2", Uuid::new_v4(), &lines(), totals(), None).unwrap();
        assert_eq!(
            order.transition_to(OrderStatus::Shipped),
            Err(OrderError::InvalidTransition { from: OrderStatus::Pending, to: OrderStatus::Shipped })
        );
        order.transition_to(OrderStatus::Cancelled).unwrap();
        assert!(order.status().is_terminal());
        assert!(order.transition_to(OrderStatus::Confirmed).is_err());
        assert!(order.transition_to(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn test_delivered_orders_refund_but_do_not_cancel() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("partially_refunded".parse::<PaymentStatus>().unwrap(), PaymentStatus::PartiallyRefunded);
        assert_eq!("processing".parse::<OrderStatus>().unwrap(), OrderStatus::Processing);
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
