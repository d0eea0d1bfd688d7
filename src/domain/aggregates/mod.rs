//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;
pub mod product;

pub use cart::{AppliedCoupon, Cart, CartLine, CartQuote};
pub use coupon::{Coupon, CouponDefinitionError, CouponRecord, CouponRejection, DiscountType};
pub use order::{LineItem, Order, OrderError, OrderRecord, OrderStatus, PaymentStatus};
pub use product::{InventoryChange, Product, ProductError, ProductRecord};
