//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Coupon(CouponEvent),
    Inventory(InventoryEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, user_id: Uuid, total: Decimal },
    StatusChanged { order_id: Uuid, from: String, to: String },
    Shipped { order_id: Uuid, carrier: Option<String>, tracking: Option<String> },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CouponEvent {
    Redeemed { coupon_id: Uuid, code: String, order_id: Uuid, discount: Decimal },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    Adjusted { product_id: Uuid, change: i32, quantity_after: i32 },
    OutOfStock { product_id: Uuid },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Placed { .. }) => "ecommerce.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "ecommerce.order.status_changed",
            Self::Order(OrderEvent::Shipped { .. }) => "ecommerce.order.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "ecommerce.order.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "ecommerce.order.cancelled",
            Self::Coupon(CouponEvent::Redeemed { .. }) => "ecommerce.coupon.redeemed",
            Self::Inventory(InventoryEvent::Adjusted { .. }) => "ecommerce.inventory.adjusted",
            Self::Inventory(InventoryEvent::OutOfStock { .. }) => "ecommerce.inventory.out_of_stock",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_payload() {
        let id = Uuid::new_v4();
        let event = DomainEvent::Order(OrderEvent::Delivered { order_id: id });
        assert_eq!(event.subject(), "ecommerce.order.delivered");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "delivered");
        assert_eq!(json["order_id"], id.to_string());
    }
}
