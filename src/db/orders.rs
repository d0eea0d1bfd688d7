//! Orders and their line items.

use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{CartLine, Order, OrderRecord, OrderStatus, PaymentStatus};
use crate::domain::events::DomainEvent;
use crate::models::OrderItem;
use crate::{EcommerceError, Result};

/// Customer-supplied fields stored with a new order.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct OrderDetails {
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
    pub shipping_address_id: Option<Uuid>,
    pub billing_address_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Back-office edits that do not change the status.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct OrderUpdate {
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(max = 100))]
    pub carrier: Option<String>,
    #[validate(length(max = 2000))]
    pub admin_notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Default, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

/// Outcome of a status change.
#[derive(Debug)]
pub struct StatusChange {
    pub order: OrderRecord,
    pub events: Vec<DomainEvent>,
}

fn snapshot(line: &CartLine) -> serde_json::Value {
    serde_json::json!({
        "name": line.name,
        "image_url": line.image_url,
        "category_id": line.category_id,
        "list_price": line.list_price,
        "unit_price": line.unit_price,
    })
}

fn stored(record: &OrderRecord) -> Result<Order> {
    Order::try_from(record).map_err(|e| EcommerceError::Validation(format!("stored order has unknown value {}", e.0)))
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a freshly placed order with one item row per cart line.
    pub async fn insert(conn: &mut PgConnection, order: &Order, lines: &[CartLine], details: &OrderDetails) -> Result<OrderRecord> {
        let totals = order.totals();
        let record = sqlx::query_as::<_, OrderRecord>(
            "INSERT INTO orders (id, order_number, user_id, status, payment_status, payment_method, subtotal, discount_amount,
                                 shipping_amount, tax_amount, total_amount, coupon_id, coupon_code,
                                 shipping_address_id, billing_address_id, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) RETURNING *",
        )
        .bind(order.id())
        .bind(order.order_number())
        .bind(order.user_id())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(&details.payment_method)
        .bind(totals.subtotal)
        .bind(totals.discount)
        .bind(totals.shipping)
        .bind(totals.tax)
        .bind(totals.total)
        .bind(order.coupon_id())
        .bind(order.coupon_code())
        .bind(details.shipping_address_id)
        .bind(details.billing_address_id)
        .bind(&details.notes)
        .fetch_one(&mut *conn)
        .await?;

        for (item, line) in order.items().iter().zip(lines) {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price, total_price, product_snapshot)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id())
            .bind(item.product_id)
            .bind(i32::try_from(item.quantity).map_err(|_| EcommerceError::InvalidQuantity)?)
            .bind(item.unit_price)
            .bind(item.total)
            .bind(snapshot(line))
            .execute(&mut *conn)
            .await?;
        }
        Ok(record)
    }

    pub async fn list(&self, filter: &OrderFilter) -> Result<(Vec<OrderRecord>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        Self::push_filters(&mut count, filter);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        Self::push_filters(&mut query, filter);
        query.push(" ORDER BY created_at DESC LIMIT ").push_bind(filter.limit).push(" OFFSET ").push_bind(filter.offset);
        let orders = query.build_query_as::<OrderRecord>().fetch_all(self.pool).await?;
        Ok((orders, total))
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<OrderRecord> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::OrderNotFound)
    }

    /// An order owned by `user_id`; someone else's order is reported as missing.
    pub async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<OrderRecord> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::OrderNotFound)
    }

    pub async fn find_by_number(&self, order_number: &str, user_id: Uuid) -> Result<OrderRecord> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE order_number = $1 AND user_id = $2")
            .bind(order_number.trim().to_uppercase())
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::OrderNotFound)
    }

    pub async fn items_for(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id)
            .fetch_all(self.pool)
            .await?)
    }

    /// Move an order through its lifecycle, stamping ship and delivery times.
    ///
    /// # Errors
    ///
    /// `Order(InvalidTransition)` when the lifecycle forbids the move.
    pub async fn change_status(&self, id: Uuid, next: OrderStatus) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock(&mut *tx, id).await?;
        let mut order = stored(&current)?;
        order.transition_to(next)?;
        let record = sqlx::query_as::<_, OrderRecord>(
            "UPDATE orders SET status = $2, shipped_at = $3, delivered_at = $4, updated_at = $5 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(order.status().as_str())
        .bind(order.shipped_at())
        .bind(order.delivered_at())
        .bind(order.updated_at())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(StatusChange { order: record, events: order.take_events() })
    }

    /// Apply back-office edits; fields left out keep their value.
    pub async fn update_details(&self, id: Uuid, update: &OrderUpdate) -> Result<OrderRecord> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock(&mut *tx, id).await?;
        let mut order = stored(&current)?;
        if update.carrier.is_some() || update.tracking_number.is_some() {
            let carrier = update.carrier.clone().or_else(|| order.carrier().map(str::to_string));
            let tracking = update.tracking_number.clone().or_else(|| order.tracking_number().map(str::to_string));
            order.set_tracking(carrier, tracking);
        }
        if let Some(payment) = update.payment_status {
            order.set_payment_status(payment);
        }
        let record = sqlx::query_as::<_, OrderRecord>(
            "UPDATE orders SET carrier = $2, tracking_number = $3, payment_status = $4,
                    admin_notes = COALESCE($5, admin_notes), updated_at = $6
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(order.carrier())
        .bind(order.tracking_number())
        .bind(order.payment_status().as_str())
        .bind(&update.admin_notes)
        .bind(order.updated_at())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<OrderRecord> {
        sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(EcommerceError::OrderNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_filter_sql() {
        let filter = OrderFilter { status: Some(OrderStatus::Shipped), user_id: Some(Uuid::new_v4()), limit: 20, offset: 0 };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        OrderRepository::push_filters(&mut builder, &filter);
        assert_eq!(builder.sql(), "SELECT * FROM orders WHERE TRUE AND status = $1 AND user_id = $2");
    }

    #[test]
    fn test_snapshot_keeps_prices() {
        let line = CartLine {
            product_id: Uuid::new_v4(), name: "Walnut Bookshelf".into(), category_id: None, image_url: None,
            quantity: 1, list_price: Decimal::new(300, 0), unit_price: Decimal::new(270, 0),
        };
        let value = snapshot(&line);
        assert_eq!(value["name"], "Walnut Bookshelf");
        assert_eq!(value["unit_price"], serde_json::json!(Decimal::new(270, 0)));
    }

    #[test]
    fn test_order_update_accepts_partial_payload() {
        let update: OrderUpdate = serde_json::from_str(r#"{"carrier":"FedEx","payment_status":"paid"}"#).unwrap();
        assert_eq!(update.carrier.as_deref(), Some("FedEx"));
        assert_eq!(update.payment_status, Some(PaymentStatus::Paid));
        assert!(update.tracking_number.is_none());
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_change_status_follows_lifecycle() {
        use crate::checkout::{place_order, CheckoutRequest};
        use crate::db::{test_support, CartRepository};
        use crate::domain::value_objects::Quantity;
        use crate::pricing::PricingPolicy;

        let pool = test_support::pool().await;
        let bed = test_support::product(&pool, "Queen Bed Frame", Decimal::new(700, 0), None, 3).await;
        let stand = test_support::product(&pool, "Nightstand", Decimal::new(90, 0), None, 3).await;
        let session = test_support::cart_with(&pool, bed.id, 1).await;
        CartRepository::new(&pool).add(&session, stand.id, Quantity::new(2).unwrap()).await.unwrap();
        let request = CheckoutRequest { session_id: session, coupon_code: None, details: OrderDetails::default() };
        let placed = place_order(&pool, &PricingPolicy::default(), Uuid::new_v4(), &request).await.unwrap();
        let repo = OrderRepository::new(&pool);
        let id = placed.order.order.id;

        // items come back in insertion order even though they share created_at
        let items = repo.items_for(id).await.unwrap();
        assert_eq!(items.iter().map(|i| i.product_id).collect::<Vec<_>>(), vec![bed.id, stand.id]);

        let err = repo.change_status(id, OrderStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Order(_)));

        for next in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped] {
            repo.change_status(id, next).await.unwrap();
        }
        let shipped = repo.get(id).await.unwrap();
        assert_eq!(shipped.status, "shipped");
        assert!(shipped.shipped_at.is_some());
        assert!(shipped.delivered_at.is_none());
    }
}
