//! Public catalog: products, categories and reviews.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::auth::AuthUser;
use super::AppState;
use crate::db::catalog::{PriceRange, ProductFilter, ProductSort, ReviewInput};
use crate::db::{page_window, CatalogRepository};
use crate::models::{average_rating, Category, CategorySummary, PaginatedResponse, ProductDetail, ProductView, Review};
use crate::{EcommerceError, Result};

const RELATED_PRODUCTS: i64 = 4;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/reviews", get(list_reviews).post(create_review))
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub sort: Option<ProductSort>,
    pub price_range: Option<PriceRange>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ListParams {
    /// Explicit bounds win over the named price band.
    fn into_filter(self, limit: i64, offset: i64) -> ProductFilter {
        let (band_min, band_max) = self.price_range.map_or((None, None), PriceRange::bounds);
        ProductFilter {
            category_id: self.category,
            search: self.search,
            min_price: self.min_price.or(band_min),
            max_price: self.max_price.or(band_max),
            sort: self.sort.unwrap_or_default(),
            limit,
            offset,
        }
    }
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<PaginatedResponse<ProductView>>> {
    let (page, per_page, offset) = page_window(p.page, p.per_page, 20);
    let repo = CatalogRepository::new(&s.db);
    let filter = p.into_filter(i64::from(per_page), offset);
    let (products, total) = repo.list_products(&filter).await?;
    let discounts = repo.active_category_discounts().await?;
    let now = Utc::now();
    let data = products.iter().map(|product| ProductView::build(product, &discounts, now)).collect();
    Ok(Json(PaginatedResponse { data, total, page, per_page }))
}

/// A missing category is `None`; any other failure is passed on.
fn found(lookup: Result<Category>) -> Result<Option<Category>> {
    match lookup {
        Ok(category) => Ok(Some(category)),
        Err(EcommerceError::CategoryNotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>> {
    let repo = CatalogRepository::new(&s.db);
    let product = repo.get_product(id).await?;
    let discounts = repo.active_category_discounts().await?;
    let category = match product.category_id {
        Some(category_id) => found(repo.get_category(category_id).await)?,
        None => None,
    };
    let reviews = repo.list_reviews(id).await?;
    let related = repo.related_products(&product, RELATED_PRODUCTS).await?;
    let now = Utc::now();
    Ok(Json(ProductDetail {
        product: ProductView::build(&product, &discounts, now),
        category,
        average_rating: average_rating(&reviews),
        reviews,
        related: related.iter().map(|p| ProductView::build(p, &discounts, now)).collect(),
    }))
}

async fn list_reviews(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    let repo = CatalogRepository::new(&s.db);
    repo.get_product(id).await?;
    Ok(Json(repo.list_reviews(id).await?))
}

async fn create_review(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ReviewInput>,
) -> Result<(StatusCode, Json<Review>)> {
    input.validate()?;
    let review = CatalogRepository::new(&s.db).create_review(id, user_id, &input).await?;
    tracing::info!(product_id = %id, %user_id, rating = review.rating, "review posted");
    Ok((StatusCode::CREATED, Json(review)))
}

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<CategorySummary>>> {
    Ok(Json(CatalogRepository::new(&s.db).list_categories().await?))
}

async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    Ok(Json(CatalogRepository::new(&s.db).get_category(id).await?))
}
