//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! ## Optional
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `NATS_URL` - NATS server for domain events (disabled when unset)
//! - `FREE_SHIPPING_THRESHOLD` - Subtotal at which shipping is waived (default: 500)
//! - `FLAT_SHIPPING_RATE` - Shipping charge below the threshold (default: 49.99)
//! - `TAX_RATE` - Tax as a fraction of the discounted subtotal (default: 0.08)
//! - `CURRENCY` - ISO 4217 code reported with prices (default: USD)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::pricing::PricingPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub max_connections: u32,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// NATS server URL for publishing domain events
    pub nats_url: Option<String>,
    /// Shipping and tax rules applied to every quote and order
    pub pricing: PricingPolicy,
    /// Currency code reported alongside amounts
    pub currency: String,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Calls `dotenvy::dotenv()` first so a local `.env` file is honoured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PricingPolicy::default();
        let database_url = lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let pricing = PricingPolicy {
            free_shipping_threshold: parse_or(&lookup, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            flat_shipping: parse_or(&lookup, "FLAT_SHIPPING_RATE", defaults.flat_shipping)?,
            tax_rate: parse_or(&lookup, "TAX_RATE", defaults.tax_rate)?,
        };
        if pricing.tax_rate < Decimal::ZERO || pricing.tax_rate > Decimal::ONE {
            return Err(ConfigError::InvalidEnvVar("TAX_RATE".to_string(), "must be between 0 and 1".to_string()));
        }
        for (key, amount) in [
            ("FREE_SHIPPING_THRESHOLD", pricing.free_shipping_threshold),
            ("FLAT_SHIPPING_RATE", pricing.flat_shipping),
        ] {
            if amount < Decimal::ZERO {
                return Err(ConfigError::InvalidEnvVar(key.to_string(), "cannot be negative".to_string()));
            }
        }

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            host: parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&lookup, "PORT", 8083)?,
            nats_url: lookup("NATS_URL").filter(|url| !url.is_empty()),
            pricing,
            currency: lookup("CURRENCY").unwrap_or_else(|| "USD".to_string()).to_uppercase(),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/shop")])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8083");
        assert!(config.nats_url.is_none());
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.currency, "USD");
    }

    #[test]
    fn test_missing_database_url() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "DATABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("PORT", "9000"),
            ("NATS_URL", "nats://localhost:4222"),
            ("TAX_RATE", "0.13"),
            ("FREE_SHIPPING_THRESHOLD", "1000"),
            ("CURRENCY", "npr"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.pricing.tax_rate, Decimal::new(13, 2));
        assert_eq!(config.pricing.free_shipping_threshold, Decimal::new(1000, 0));
        assert_eq!(config.currency, "NPR");
    }

    #[test]
    fn test_invalid_values() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "x"), ("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "PORT"));
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "x"), ("TAX_RATE", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "TAX_RATE"));
    }

    #[test]
    fn test_negative_shipping_names_its_key() {
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "x"), ("FREE_SHIPPING_THRESHOLD", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "FREE_SHIPPING_THRESHOLD"));
        let err = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "x"), ("FLAT_SHIPPING_RATE", "-5")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "FLAT_SHIPPING_RATE"));
    }
}
