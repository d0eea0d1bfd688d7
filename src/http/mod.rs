//! HTTP surface: storefront, account and back-office routes.

use axum::{routing::get, Json, Router};
use serde::Deserialize;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::messaging::EventPublisher;
use crate::pricing::PricingPolicy;

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pricing: PricingPolicy,
    pub currency: String,
    pub events: EventPublisher,
}

impl AppState {
    pub fn new(db: PgPool, config: &AppConfig, events: EventPublisher) -> Self {
        Self { db, pricing: config.pricing, currency: config.currency.clone(), events }
    }
}

/// `?page=&per_page=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "furnish-storefront"})) }))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(catalog::routes())
        .merge(cart::routes())
        .merge(checkout::routes())
        .nest("/account", account::routes())
        .nest("/admin", admin::routes())
}
