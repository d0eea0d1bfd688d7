//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Coupon code, stored and matched upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(String);

impl CouponCode {
    pub const MIN_LEN: usize = 3;
    pub const MAX_LEN: usize = 30;

    pub fn parse(value: &str) -> Result<Self, CouponCodeError> {
        let value = value.trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() < Self::MIN_LEN || value.len() > Self::MAX_LEN {
            return Err(CouponCodeError::Length);
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CouponCodeError::InvalidCharacter);
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CouponCodeError {
    #[error("Please enter a coupon code")]
    Empty,
    #[error("Coupon codes are 3 to 30 characters long")]
    Length,
    #[error("Coupon codes may only contain letters, digits, '-' and '_'")]
    InvalidCharacter,
}

/// Line quantity in a cart or order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub const MAX: u32 = 999;

    pub fn new(value: i64) -> Result<Self, QuantityError> {
        match u32::try_from(value) {
            Ok(0) | Err(_) => Err(QuantityError::NotPositive),
            Ok(v) if v > Self::MAX => Err(QuantityError::TooLarge),
            Ok(v) => Ok(Self(v)),
        }
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Result<Self, QuantityError> { Self::new(i64::from(self.0) + i64::from(other.0)) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("Quantity must be positive")]
    NotPositive,
    #[error("Quantity exceeds the per-line maximum")]
    TooLarge,
}

/// Role granted to an account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    AdminViewer,
    AdminManager,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::AdminViewer => "admin_viewer",
            Self::AdminManager => "admin_manager",
        }
    }
    pub fn can_view_admin(&self) -> bool { matches!(self, Self::AdminViewer | Self::AdminManager) }
    pub fn can_manage(&self) -> bool { matches!(self, Self::AdminManager) }
}

impl std::str::FromStr for UserRole {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin_viewer" => Ok(Self::AdminViewer),
            "admin_manager" => Ok(Self::AdminManager),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);
