//! Session carts.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartLine, Product, ProductRecord};
use crate::domain::value_objects::Quantity;
use crate::models::CartItemRow;
use crate::pricing::{discounted_price, CategoryDiscount};
use crate::{EcommerceError, Result};

const CART_LINES: &str = "SELECT c.product_id, c.quantity, p.name, p.category_id, p.image_url, p.price
     FROM cart_items c JOIN products p ON p.id = c.product_id
     WHERE c.session_id = $1
     ORDER BY c.created_at";

const CLAIM_LINES: &str = "WITH claimed AS (
         DELETE FROM cart_items WHERE session_id = $1 RETURNING product_id, quantity, created_at
     )
     SELECT c.product_id, c.quantity, p.name, p.category_id, p.image_url, p.price
     FROM claimed c JOIN products p ON p.id = c.product_id
     ORDER BY c.created_at";

/// Price stored cart rows into a cart aggregate.
pub fn build_cart(session_id: &str, rows: Vec<CartItemRow>, discounts: &[CategoryDiscount], now: DateTime<Utc>) -> Cart {
    let mut cart = Cart::new(session_id);
    for row in rows {
        cart.add_line(CartLine {
            product_id: row.product_id,
            unit_price: discounted_price(row.price, discounts, row.category_id, now),
            list_price: row.price,
            name: row.name,
            category_id: row.category_id,
            image_url: row.image_url,
            quantity: u32::try_from(row.quantity).unwrap_or(0),
        });
    }
    cart
}

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn rows(&self, session_id: &str) -> Result<Vec<CartItemRow>> {
        Ok(sqlx::query_as::<_, CartItemRow>(CART_LINES).bind(session_id).fetch_all(self.pool).await?)
    }

    /// Remove every line of a cart and return them priced as `rows` would.
    ///
    /// The delete holds the row locks until the transaction ends, so a
    /// concurrent claim on the same session waits and then sees an empty cart.
    pub async fn claim_in(conn: &mut PgConnection, session_id: &str) -> Result<Vec<CartItemRow>> {
        Ok(sqlx::query_as::<_, CartItemRow>(CLAIM_LINES).bind(session_id).fetch_all(&mut *conn).await?)
    }

    async fn quantity_of(&self, session_id: &str, product_id: Uuid) -> Result<Option<i32>> {
        Ok(sqlx::query_scalar::<_, i32>("SELECT quantity FROM cart_items WHERE session_id = $1 AND product_id = $2")
            .bind(session_id)
            .bind(product_id)
            .fetch_optional(self.pool)
            .await?)
    }

    async fn ensure_stock(&self, product_id: Uuid, quantity: Quantity) -> Result<()> {
        let record = sqlx::query_as::<_, ProductRecord>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::ProductNotFound)?;
        let product = Product::from(&record);
        if !product.can_supply(quantity.value()) {
            return Err(EcommerceError::InsufficientInventory(record.name));
        }
        Ok(())
    }

    /// Add units of a product; an existing line has its quantity increased.
    pub async fn add(&self, session_id: &str, product_id: Uuid, quantity: Quantity) -> Result<()> {
        let combined = match self.quantity_of(session_id, product_id).await? {
            Some(existing) => Quantity::new(i64::from(existing))
                .and_then(|q| q.add(quantity))
                .map_err(|_| EcommerceError::InvalidQuantity)?,
            None => quantity,
        };
        self.ensure_stock(product_id, combined).await?;
        sqlx::query(
            "INSERT INTO cart_items (id, session_id, product_id, quantity) VALUES ($1, $2, $3, $4)
             ON CONFLICT (session_id, product_id) DO UPDATE SET quantity = $4",
        )
        .bind(Uuid::now_v7())
        .bind(session_id)
        .bind(product_id)
        .bind(i32::try_from(combined.value()).map_err(|_| EcommerceError::InvalidQuantity)?)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Set a line's quantity; zero or less removes the line.
    pub async fn set_quantity(&self, session_id: &str, product_id: Uuid, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return self.remove(session_id, product_id).await;
        }
        let quantity = Quantity::new(quantity).map_err(|_| EcommerceError::InvalidQuantity)?;
        if self.quantity_of(session_id, product_id).await?.is_none() {
            return Err(EcommerceError::ProductNotFound);
        }
        self.ensure_stock(product_id, quantity).await?;
        sqlx::query("UPDATE cart_items SET quantity = $3 WHERE session_id = $1 AND product_id = $2")
            .bind(session_id)
            .bind(product_id)
            .bind(i32::try_from(quantity.value()).map_err(|_| EcommerceError::InvalidQuantity)?)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, session_id: &str, product_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE session_id = $1 AND product_id = $2")
            .bind(session_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::ProductNotFound); }
        Ok(())
    }

    pub async fn clear(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE session_id = $1").bind(session_id).execute(self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_build_cart_prices_lines() {
        let living = Uuid::new_v4();
        let rows = vec![
            CartItemRow { product_id: Uuid::new_v4(), quantity: 2, name: "Sectional Sofa".into(), category_id: Some(living), image_url: None, price: Decimal::new(1299, 0) },
            CartItemRow { product_id: Uuid::new_v4(), quantity: 1, name: "Office Desk".into(), category_id: None, image_url: None, price: Decimal::new(450, 0) },
        ];
        let discounts = vec![CategoryDiscount {
            id: Uuid::new_v4(), category_id: living, discount_percentage: Decimal::new(10, 0), is_active: true,
            valid_from: None, valid_until: None, created_at: Utc::now(),
        }];
        let cart = build_cart("sess", rows, &discounts, Utc::now());
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.lines()[0].unit_price, Decimal::new(11691, 1));
        assert_eq!(cart.lines()[0].list_price, Decimal::new(1299, 0));
        assert_eq!(cart.subtotal(), Decimal::new(27882, 1));
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn test_claim_empties_the_cart_once() {
        use crate::db::test_support;

        let pool = test_support::pool().await;
        let chair = test_support::product(&pool, "Accent Chair", Decimal::new(240, 0), None, 5).await;
        let session = test_support::cart_with(&pool, chair.id, 2).await;

        let mut tx = pool.begin().await.unwrap();
        let claimed = CartRepository::claim_in(&mut *tx, &session).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].quantity, 2);
        assert!(CartRepository::claim_in(&mut *tx, &session).await.unwrap().is_empty());
        tx.rollback().await.unwrap();

        // a rolled back claim leaves the cart in place
        assert_eq!(CartRepository::new(&pool).rows(&session).await.unwrap().len(), 1);
    }
}
