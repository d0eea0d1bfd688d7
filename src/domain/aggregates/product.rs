//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, InventoryEvent};

/// `products` table row.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ProductRecord {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub sku: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub in_stock: bool,
    pub stock_quantity: i32,
    pub weight: Option<f64>,
    pub dimensions: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of stock movement recorded in `inventory_transactions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryChange { Sale, Adjustment, Restock }

impl InventoryChange {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Sale => "sale", Self::Adjustment => "adjustment", Self::Restock => "restock" }
    }
}

/// Stock bookkeeping for one product.
#[derive(Clone, Debug)]
pub struct Product {
    id: Uuid,
    name: String,
    in_stock: bool,
    stock_quantity: i32,
    events: Vec<DomainEvent>,
}

impl Product {
    pub fn new(id: Uuid, name: impl Into<String>, in_stock: bool, stock_quantity: i32) -> Self {
        Self { id, name: name.into(), in_stock, stock_quantity, events: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn in_stock(&self) -> bool { self.in_stock }
    pub fn stock_quantity(&self) -> i32 { self.stock_quantity }

    /// Sellable only when flagged in stock and units remain.
    pub fn is_available(&self) -> bool { self.in_stock && self.stock_quantity > 0 }

    pub fn can_supply(&self, qty: u32) -> bool {
        self.is_available() && i64::from(self.stock_quantity) >= i64::from(qty)
    }

    /// Take `qty` units for a sale.
    pub fn reserve(&mut self, qty: u32) -> Result<(), ProductError> {
        if !self.can_supply(qty) {
            return Err(ProductError::InsufficientInventory { name: self.name.clone(), available: self.stock_quantity.max(0) });
        }
        let qty = i32::try_from(qty).map_err(|_| ProductError::InvalidAdjustment)?;
        self.apply(-qty);
        Ok(())
    }

    /// Manual stock correction or restock; stock never goes negative.
    pub fn adjust(&mut self, change: i32) -> Result<(), ProductError> {
        if change == 0 { return Err(ProductError::InvalidAdjustment); }
        let after = self.stock_quantity.checked_add(change).ok_or(ProductError::InvalidAdjustment)?;
        if after < 0 {
            return Err(ProductError::InsufficientInventory { name: self.name.clone(), available: self.stock_quantity });
        }
        self.apply(change);
        if change > 0 { self.in_stock = true; }
        Ok(())
    }

    fn apply(&mut self, change: i32) {
        self.stock_quantity += change;
        self.raise_event(DomainEvent::Inventory(InventoryEvent::Adjusted {
            product_id: self.id, change, quantity_after: self.stock_quantity,
        }));
        if self.stock_quantity == 0 {
            self.in_stock = false;
            self.raise_event(DomainEvent::Inventory(InventoryEvent::OutOfStock { product_id: self.id }));
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

impl From<&ProductRecord> for Product {
    fn from(r: &ProductRecord) -> Self { Self::new(r.id, r.name.clone(), r.in_stock, r.stock_quantity) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Price cannot be negative")]
    NegativePrice,
    #[error("Stock adjustment must be a non-zero amount")]
    InvalidAdjustment,
    #[error("Insufficient inventory for {name} ({available} available)")]
    InsufficientInventory { name: String, available: i32 },
}
