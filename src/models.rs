//! Table rows and API views.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{OrderRecord, ProductRecord};
use crate::pricing::{effective_category_discount, CategoryDiscount};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category as listed on the storefront.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategorySummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub category: Category,
    pub product_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub first_name: String,
    pub last_name: String,
    pub company: Option<String>,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart row joined with the product it points at.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub product_id: Uuid,
    pub quantity: i32,
    pub name: String,
    pub category_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub product_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity_change: i32,
    pub quantity_after: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Storefront listing entry with the category markdown applied.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category_id: Option<Uuid>,
    pub in_stock: bool,
    pub stock_quantity: i32,
}

impl ProductView {
    pub fn build(product: &ProductRecord, discounts: &[CategoryDiscount], now: DateTime<Utc>) -> Self {
        let discount = effective_category_discount(discounts, product.category_id, now);
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone().unwrap_or_default(),
            sku: product.sku.clone(),
            price: discount.map_or(product.price, |d| d.apply(product.price)),
            original_price: discount.map(|_| product.price),
            image_url: product.image_url.clone(),
            category_id: product.category_id,
            in_stock: product.in_stock && product.stock_quantity > 0,
            stock_quantity: product.stock_quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductView,
    pub category: Option<Category>,
    pub average_rating: Option<Decimal>,
    pub reviews: Vec<Review>,
    pub related: Vec<ProductView>,
}

/// Mean of valid (1..=5) ratings, to one decimal place.
pub fn average_rating(reviews: &[Review]) -> Option<Decimal> {
    let valid: Vec<i16> = reviews.iter().map(|r| r.rating).filter(|r| (1..=5).contains(r)).collect();
    if valid.is_empty() {
        return None;
    }
    let sum: i64 = valid.iter().map(|r| i64::from(*r)).sum();
    Some((Decimal::from(sum) / Decimal::from(valid.len())).round_dp(1))
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub items: Vec<OrderItem>,
}

/// What a customer sees when tracking an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderTracking {
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub total_amount: Decimal,
}

impl From<&OrderRecord> for OrderTracking {
    fn from(o: &OrderRecord) -> Self {
        Self {
            order_number: o.order_number.clone(),
            status: o.status.clone(),
            payment_status: o.payment_status.clone(),
            carrier: o.carrier.clone(),
            tracking_number: o.tracking_number.clone(),
            placed_at: o.created_at,
            shipped_at: o.shipped_at,
            delivered_at: o.delivered_at,
            total_amount: o.total_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdminUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_categories: i64,
    pub new_users_last_7_days: i64,
    pub total_orders: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(category: Option<Uuid>) -> ProductRecord {
        let now = Utc::now();
        ProductRecord {
            id: Uuid::new_v4(), category_id: category, sku: Some("ARM-1".into()), name: "Luxury Leather Armchair".into(),
            description: None, price: Decimal::new(899, 0), image_url: None, in_stock: true, stock_quantity: 0,
            weight: None, dimensions: None, created_at: now, updated_at: now,
        }
    }

    #[test]
    fn test_product_view_applies_category_discount() {
        let category = Uuid::new_v4();
        let discounts = vec![CategoryDiscount {
            id: Uuid::new_v4(), category_id: category, discount_percentage: Decimal::new(20, 0), is_active: true,
            valid_from: None, valid_until: None, created_at: Utc::now(),
        }];
        let view = ProductView::build(&product(Some(category)), &discounts, Utc::now());
        assert_eq!(view.price, Decimal::new(7192, 1));
        assert_eq!(view.original_price, Some(Decimal::new(899, 0)));
        // flagged in stock but no units left
        assert!(!view.in_stock);

        let plain = ProductView::build(&product(None), &discounts, Utc::now());
        assert_eq!(plain.price, Decimal::new(899, 0));
        assert_eq!(plain.original_price, None);
    }

    #[test]
    fn test_average_rating() {
        let review = |rating| Review {
            id: Uuid::new_v4(), product_id: Uuid::new_v4(), user_id: Uuid::new_v4(), rating, comment: None, created_at: Utc::now(),
        };
        assert_eq!(average_rating(&[]), None);
        assert_eq!(average_rating(&[review(5), review(4), review(4)]), Some(Decimal::new(43, 1)));
        assert_eq!(average_rating(&[review(0), review(3)]), Some(Decimal::new(3, 0)));
    }
}
