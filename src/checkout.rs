//! Turning a session cart into an order.
//!
//! Everything that changes state happens in one transaction. The cart is
//! claimed first, so two checkouts of one session cannot both see its
//! lines. Stock is then reserved and logged, the coupon use is counted and
//! the order and its items are written. Events are only handed back once
//! the transaction has committed.

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::db::orders::OrderDetails;
use crate::db::{carts, AccountRepository, CartRepository, CatalogRepository, CouponRepository, OrderRepository};
use crate::domain::aggregates::{InventoryChange, Order, Product};
use crate::domain::events::{CouponEvent, DomainEvent};
use crate::models::OrderWithItems;
use crate::pricing::PricingPolicy;
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    pub coupon_code: Option<String>,
    #[serde(flatten)]
    #[validate]
    pub details: OrderDetails,
}

#[derive(Debug)]
pub struct PlacedOrder {
    pub order: OrderWithItems,
    pub events: Vec<DomainEvent>,
}

/// `ORD-` followed by eight digits.
pub fn order_number() -> String {
    format!("ORD-{:08}", rand::random::<u32>() % 100_000_000)
}

/// Place an order for `user_id` from the cart in `request.session_id`.
///
/// # Errors
///
/// - `EmptyCart` when the cart has no lines
/// - `CouponNotFound` / `CouponRejected` for an unusable coupon code
/// - `InsufficientInventory` when a line can no longer be supplied
/// - `AddressNotFound` when an address id is not the caller's
pub async fn place_order(pool: &PgPool, policy: &PricingPolicy, user_id: Uuid, request: &CheckoutRequest) -> Result<PlacedOrder> {
    request.validate()?;
    let accounts = AccountRepository::new(pool);
    for id in [request.details.shipping_address_id, request.details.billing_address_id].into_iter().flatten() {
        accounts.get_address(user_id, id).await?;
    }
    let discounts = CatalogRepository::new(pool).active_category_discounts().await?;
    let coupon_code = request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let coupon_id = match coupon_code {
        Some(code) => Some(CouponRepository::new(pool).find_by_code(code).await?.id),
        None => None,
    };

    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let rows = CartRepository::claim_in(&mut *tx, &request.session_id).await?;
    if rows.is_empty() {
        return Err(EcommerceError::EmptyCart);
    }
    let cart = carts::build_cart(&request.session_id, rows, &discounts, now);

    let coupon = match coupon_id {
        Some(id) => Some(CouponRepository::lock(&mut *tx, id).await?),
        None => None,
    };
    let discount = match &coupon {
        Some(c) => cart.coupon_discount(c, now)?,
        None => rust_decimal::Decimal::ZERO,
    };
    let totals = policy.totals(cart.subtotal(), discount);
    let mut order = Order::place(
        order_number(),
        user_id,
        cart.lines(),
        totals,
        coupon.as_ref().map(|c| (c.id, c.code.to_string())),
    )?;

    let mut events = order.take_events();

    // rows are locked in product id order
    let mut lines: Vec<_> = cart.lines().iter().collect();
    lines.sort_by_key(|l| l.product_id);
    for line in lines {
        let record = CatalogRepository::lock_product(&mut *tx, line.product_id).await?;
        let mut product = Product::from(&record);
        product.reserve(line.quantity)?;
        let change = -i32::try_from(line.quantity).map_err(|_| EcommerceError::InvalidQuantity)?;
        let movement = CatalogRepository::record_stock(
            &mut *tx,
            &mut product,
            change,
            InventoryChange::Sale,
            Some(("order", order.id())),
            None,
            Some(user_id),
        )
        .await?;
        events.extend(movement.events);
    }

    if let Some(coupon) = &coupon {
        CouponRepository::redeem(&mut *tx, coupon.id).await?;
        events.push(DomainEvent::Coupon(CouponEvent::Redeemed {
            coupon_id: coupon.id,
            code: coupon.code.to_string(),
            order_id: order.id(),
            discount: totals.discount,
        }));
    }

    let record = OrderRepository::insert(&mut *tx, &order, cart.lines(), &request.details).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = %record.id,
        order_number = %record.order_number,
        user_id = %user_id,
        total = %record.total_amount,
        "order placed"
    );
    let items = OrderRepository::new(pool).items_for(record.id).await?;
    Ok(PlacedOrder { order: OrderWithItems { order: record, items }, events })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        for _ in 0..50 {
            let number = order_number();
            assert_eq!(number.len(), 12);
            assert!(number.starts_with("ORD-"));
            assert!(number[4..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_checkout_request_from_json() {
        let request: CheckoutRequest = serde_json::from_value(serde_json::json!({
            "session_id": "sess-42",
            "coupon_code": "welcome10",
            "payment_method": "cash_on_delivery",
            "notes": "Leave at the gate"
        }))
        .unwrap();
        assert_eq!(request.details.payment_method.as_deref(), Some("cash_on_delivery"));
        assert!(request.validate().is_ok());

        let empty_session = CheckoutRequest { session_id: String::new(), ..request };
        assert!(empty_session.validate().is_err());
    }

    mod with_database {
        use rust_decimal::Decimal;

        use super::*;
        use crate::db::test_support;
        use crate::domain::aggregates::DiscountType;
        use crate::CouponRejection;

        fn request(session_id: &str, coupon_code: Option<&str>) -> CheckoutRequest {
            CheckoutRequest {
                session_id: session_id.to_string(),
                coupon_code: coupon_code.map(str::to_string),
                details: OrderDetails { payment_method: Some("card".into()), ..OrderDetails::default() },
            }
        }

        #[tokio::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_empty_cart_is_refused() {
            let pool = test_support::pool().await;
            let user = Uuid::new_v4();
            let err = place_order(&pool, &PricingPolicy::default(), user, &request(&test_support::unique("sess"), None))
                .await
                .unwrap_err();
            assert!(matches!(err, EcommerceError::EmptyCart));
            assert_eq!(test_support::orders_of(&pool, user).await, 0);
        }

        #[tokio::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_order_reserves_stock_and_redeems_coupon() {
            let pool = test_support::pool().await;
            let table = test_support::product(&pool, "Oak Dining Table", Decimal::new(500, 0), None, 10).await;
            let coupon = test_support::coupon(&pool, test_support::coupon_input(DiscountType::Percentage, Decimal::TEN)).await;
            let session = test_support::cart_with(&pool, table.id, 3).await;
            let user = Uuid::new_v4();

            let placed = place_order(&pool, &PricingPolicy::default(), user, &request(&session, Some(coupon.code.as_str())))
                .await
                .unwrap();

            assert_eq!(placed.order.order.subtotal, Decimal::new(1500, 0));
            assert_eq!(placed.order.order.discount_amount, Decimal::new(150, 0));
            assert_eq!(placed.order.items.len(), 1);
            assert_eq!(placed.order.items[0].quantity, 3);
            assert!(placed.events.iter().any(|e| matches!(e, DomainEvent::Coupon(CouponEvent::Redeemed { .. }))));
            assert_eq!(test_support::stock_of(&pool, table.id).await, 7);
            assert_eq!(test_support::ledger_rows(&pool, table.id).await, 1);
            assert_eq!(CouponRepository::new(&pool).get(coupon.id).await.unwrap().used_count, 1);
            assert!(CartRepository::new(&pool).rows(&session).await.unwrap().is_empty());
        }

        #[tokio::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_concurrent_checkouts_of_one_cart_place_one_order() {
            let pool = test_support::pool().await;
            let sofa = test_support::product(&pool, "Sofa", Decimal::new(900, 0), None, 10).await;
            let session = test_support::cart_with(&pool, sofa.id, 2).await;
            let user = Uuid::new_v4();
            let policy = PricingPolicy::default();
            let req = request(&session, None);

            let (a, b) = tokio::join!(place_order(&pool, &policy, user, &req), place_order(&pool, &policy, user, &req));

            assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
            let err = a.err().or(b.err()).unwrap();
            assert!(matches!(err, EcommerceError::EmptyCart));
            assert_eq!(test_support::orders_of(&pool, user).await, 1);
            assert_eq!(test_support::stock_of(&pool, sofa.id).await, 8);
        }

        #[tokio::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_used_up_coupon_writes_nothing() {
            let pool = test_support::pool().await;
            let lamp = test_support::product(&pool, "Floor Lamp", Decimal::new(120, 0), None, 4).await;
            let mut input = test_support::coupon_input(DiscountType::FixedAmount, Decimal::new(20, 0));
            input.usage_limit = Some(1);
            let coupon = test_support::coupon(&pool, input).await;
            let mut conn = pool.acquire().await.unwrap();
            CouponRepository::redeem(&mut conn, coupon.id).await.unwrap();
            drop(conn);
            let session = test_support::cart_with(&pool, lamp.id, 1).await;
            let user = Uuid::new_v4();

            let err = place_order(&pool, &PricingPolicy::default(), user, &request(&session, Some(coupon.code.as_str())))
                .await
                .unwrap_err();

            assert!(matches!(err, EcommerceError::CouponRejected(CouponRejection::UsageLimitReached)));
            assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(test_support::orders_of(&pool, user).await, 0);
            assert_eq!(test_support::stock_of(&pool, lamp.id).await, 4);
            assert_eq!(test_support::ledger_rows(&pool, lamp.id).await, 0);
            assert_eq!(CartRepository::new(&pool).rows(&session).await.unwrap().len(), 1);
        }
    }
}
