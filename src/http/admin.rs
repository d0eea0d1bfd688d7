//! Back office. Reads need `admin_viewer`, writes need `admin_manager`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::account::with_items;
use super::auth::{AdminManager, AdminViewer};
use super::AppState;
use crate::db::accounts::UserFilter;
use crate::db::catalog::{CategoryDiscountInput, CategoryInput, ProductFilter, ProductInput, ProductSort};
use crate::db::coupons::CouponInput;
use crate::db::orders::{OrderFilter, OrderUpdate};
use crate::db::{page_window, AccountRepository, CatalogRepository, CouponRepository, OrderRepository};
use crate::domain::aggregates::{Coupon, OrderRecord, OrderStatus, ProductRecord};
use crate::domain::value_objects::{Sku, UserRole};
use crate::models::{AdminUser, Category, DashboardStats, InventoryTransaction, OrderWithItems, PaginatedResponse};
use crate::pricing::CategoryDiscount;
use crate::{EcommerceError, Result};

const USERS_PER_PAGE: u32 = 10;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/users", get(list_users))
        .route("/users/:user_id", axum::routing::delete(delete_user))
        .route("/users/:user_id/role", put(set_role))
        .route("/categories", post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/category-discounts", get(list_category_discounts).post(create_category_discount))
        .route("/category-discounts/:id", axum::routing::delete(delete_category_discount))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:id", get(get_coupon).put(update_coupon).delete(delete_coupon))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/inventory", post(adjust_inventory))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order).patch(update_order))
        .route("/orders/:id/status", put(change_status))
}

fn parse_filter<T: std::str::FromStr>(value: Option<&str>, field: &str) -> Result<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| EcommerceError::Validation(format!("unknown {field} '{raw}'"))),
    }
}

async fn stats(State(s): State<AppState>, AdminViewer(_): AdminViewer) -> Result<Json<DashboardStats>> {
    Ok(Json(AccountRepository::new(&s.db).stats().await?))
}

// --- users ---

#[derive(Debug, Default, Deserialize)]
pub struct UserParams {
    pub page: Option<u32>,
    pub role: Option<String>,
    pub search: Option<String>,
}

async fn list_users(
    State(s): State<AppState>,
    AdminViewer(_): AdminViewer,
    Query(p): Query<UserParams>,
) -> Result<Json<PaginatedResponse<AdminUser>>> {
    let (page, per_page, offset) = page_window(p.page, Some(USERS_PER_PAGE), USERS_PER_PAGE);
    let filter = UserFilter { role: parse_filter(p.role.as_deref(), "role")?, search: p.search, limit: i64::from(per_page), offset };
    let (data, total) = AccountRepository::new(&s.db).list_users(&filter).await?;
    Ok(Json(PaginatedResponse { data, total, page, per_page }))
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

async fn set_role(
    State(s): State<AppState>,
    AdminManager(actor): AdminManager,
    Path(user_id): Path<Uuid>,
    Json(r): Json<RoleRequest>,
) -> Result<StatusCode> {
    if user_id == actor {
        return Err(EcommerceError::Validation("you cannot change your own role".into()));
    }
    AccountRepository::new(&s.db).set_role(user_id, r.role).await?;
    tracing::info!(%actor, %user_id, role = r.role.as_str(), "role changed");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(State(s): State<AppState>, AdminManager(actor): AdminManager, Path(user_id): Path<Uuid>) -> Result<StatusCode> {
    if user_id == actor {
        return Err(EcommerceError::Validation("you cannot delete your own account".into()));
    }
    AccountRepository::new(&s.db).delete_user(user_id).await?;
    tracing::info!(%actor, %user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- categories ---

async fn create_category(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Json(input): Json<CategoryInput>,
) -> Result<(StatusCode, Json<Category>)> {
    input.validate()?;
    Ok((StatusCode::CREATED, Json(CatalogRepository::new(&s.db).create_category(&input).await?)))
}

async fn update_category(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Path(id): Path<Uuid>,
    Json(input): Json<CategoryInput>,
) -> Result<Json<Category>> {
    input.validate()?;
    Ok(Json(CatalogRepository::new(&s.db).update_category(id, &input).await?))
}

async fn delete_category(State(s): State<AppState>, AdminManager(_): AdminManager, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CatalogRepository::new(&s.db).delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_category_discounts(State(s): State<AppState>, AdminViewer(_): AdminViewer) -> Result<Json<Vec<CategoryDiscount>>> {
    Ok(Json(CatalogRepository::new(&s.db).list_category_discounts().await?))
}

async fn create_category_discount(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Json(input): Json<CategoryDiscountInput>,
) -> Result<(StatusCode, Json<CategoryDiscount>)> {
    let discount = CatalogRepository::new(&s.db).create_category_discount(&input).await?;
    tracing::info!(category_id = %discount.category_id, percentage = %discount.discount_percentage, "category discount created");
    Ok((StatusCode::CREATED, Json(discount)))
}

async fn delete_category_discount(State(s): State<AppState>, AdminManager(_): AdminManager, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CatalogRepository::new(&s.db).delete_category_discount(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- coupons ---

async fn list_coupons(State(s): State<AppState>, AdminViewer(_): AdminViewer) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(CouponRepository::new(&s.db).list().await?))
}

async fn get_coupon(State(s): State<AppState>, AdminViewer(_): AdminViewer, Path(id): Path<Uuid>) -> Result<Json<Coupon>> {
    Ok(Json(CouponRepository::new(&s.db).get(id).await?))
}

async fn create_coupon(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Json(input): Json<CouponInput>,
) -> Result<(StatusCode, Json<Coupon>)> {
    let coupon = CouponRepository::new(&s.db).create(input).await?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Path(id): Path<Uuid>,
    Json(input): Json<CouponInput>,
) -> Result<Json<Coupon>> {
    Ok(Json(CouponRepository::new(&s.db).update(id, input).await?))
}

async fn delete_coupon(State(s): State<AppState>, AdminManager(_): AdminManager, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CouponRepository::new(&s.db).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- products ---

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub sort: Option<ProductSort>,
}

async fn list_products(
    State(s): State<AppState>,
    AdminViewer(_): AdminViewer,
    Query(p): Query<ProductParams>,
) -> Result<Json<PaginatedResponse<ProductRecord>>> {
    let (page, per_page, offset) = page_window(p.page, p.per_page, 20);
    let filter = ProductFilter {
        category_id: p.category,
        search: p.search,
        sort: p.sort.unwrap_or(ProductSort::Newest),
        limit: i64::from(per_page),
        offset,
        ..ProductFilter::default()
    };
    let (data, total) = CatalogRepository::new(&s.db).list_products(&filter).await?;
    Ok(Json(PaginatedResponse { data, total, page, per_page }))
}

fn prepare_product(mut input: ProductInput) -> Result<ProductInput> {
    input.validate()?;
    input.check()?;
    input.sku = match input.sku.take() {
        Some(raw) => Some(Sku::new(raw).map_err(|e| EcommerceError::Validation(e.to_string()))?.into_inner()),
        None => None,
    };
    Ok(input)
}

async fn create_product(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<ProductRecord>)> {
    let input = prepare_product(input)?;
    let product = CatalogRepository::new(&s.db).create_product(&input).await?;
    tracing::info!(product_id = %product.id, name = %product.name, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Path(id): Path<Uuid>,
    Json(input): Json<ProductInput>,
) -> Result<Json<ProductRecord>> {
    let input = prepare_product(input)?;
    Ok(Json(CatalogRepository::new(&s.db).update_product(id, &input).await?))
}

async fn delete_product(State(s): State<AppState>, AdminManager(_): AdminManager, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CatalogRepository::new(&s.db).delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct InventoryRequest {
    pub change: i32,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

async fn adjust_inventory(
    State(s): State<AppState>,
    AdminManager(actor): AdminManager,
    Path(id): Path<Uuid>,
    Json(r): Json<InventoryRequest>,
) -> Result<Json<InventoryTransaction>> {
    r.validate()?;
    let movement = CatalogRepository::new(&s.db).adjust_stock(id, r.change, r.notes.as_deref(), actor).await?;
    tracing::info!(product_id = %id, change = r.change, quantity_after = movement.transaction.quantity_after, "stock adjusted");
    s.events.publish(movement.events).await;
    Ok(Json(movement.transaction))
}

// --- orders ---

#[derive(Debug, Default, Deserialize)]
pub struct OrderParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
}

async fn list_orders(
    State(s): State<AppState>,
    AdminViewer(_): AdminViewer,
    Query(p): Query<OrderParams>,
) -> Result<Json<PaginatedResponse<OrderWithItems>>> {
    let (page, per_page, offset) = page_window(p.page, p.per_page, 20);
    let filter = OrderFilter {
        status: parse_filter(p.status.as_deref(), "status")?,
        user_id: None,
        limit: i64::from(per_page),
        offset,
    };
    let repo = OrderRepository::new(&s.db);
    let (orders, total) = repo.list(&filter).await?;
    let data = with_items(&repo, orders).await?;
    Ok(Json(PaginatedResponse { data, total, page, per_page }))
}

async fn get_order(State(s): State<AppState>, AdminViewer(_): AdminViewer, Path(id): Path<Uuid>) -> Result<Json<OrderWithItems>> {
    let repo = OrderRepository::new(&s.db);
    let order = repo.get(id).await?;
    let items = repo.items_for(id).await?;
    Ok(Json(OrderWithItems { order, items }))
}

async fn update_order(
    State(s): State<AppState>,
    AdminManager(_): AdminManager,
    Path(id): Path<Uuid>,
    Json(update): Json<OrderUpdate>,
) -> Result<Json<OrderRecord>> {
    update.validate()?;
    Ok(Json(OrderRepository::new(&s.db).update_details(id, &update).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

async fn change_status(
    State(s): State<AppState>,
    AdminManager(actor): AdminManager,
    Path(id): Path<Uuid>,
    Json(r): Json<StatusRequest>,
) -> Result<Json<OrderRecord>> {
    let change = OrderRepository::new(&s.db).change_status(id, r.status).await?;
    tracing::info!(order_id = %id, %actor, status = r.status.as_str(), "order status changed");
    s.events.publish(change.events).await;
    Ok(Json(change.order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    use crate::http::test_support::{assert_error, send};

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter::<OrderStatus>(Some("shipped"), "status").unwrap(), Some(OrderStatus::Shipped));
        assert_eq!(parse_filter::<UserRole>(Some("  "), "role").unwrap(), None);
        assert!(matches!(parse_filter::<UserRole>(Some("root"), "role"), Err(EcommerceError::Validation(_))));
    }

    #[test]
    fn test_prepare_product_normalises_sku() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Teak Dining Table", "price": "749.00", "sku": "tbl-teak-6"
        }))
        .unwrap();
        let prepared = prepare_product(input).unwrap();
        assert_eq!(prepared.sku.as_deref(), Some("TBL-TEAK-6"));
    }

    #[tokio::test]
    async fn test_admin_routes_require_user() {
        for uri in ["/api/v1/admin/stats", "/api/v1/admin/users", "/api/v1/admin/orders", "/api/v1/admin/coupons"] {
            let response = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_error(response, StatusCode::UNAUTHORIZED).await;
        }
    }
}
