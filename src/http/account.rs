//! The signed-in customer's profile, addresses and orders.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::auth::AuthUser;
use super::{AppState, PageParams};
use crate::db::accounts::{AddressInput, ProfileInput};
use crate::db::orders::OrderFilter;
use crate::db::{page_window, AccountRepository, OrderRepository};
use crate::domain::aggregates::OrderRecord;
use crate::models::{Address, OrderTracking, OrderWithItems, PaginatedResponse, Profile};
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/:id", get(get_address).put(update_address).delete(delete_address))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/tracking", get(track_order))
        .route("/tracking/:order_number", get(track_by_number))
}

async fn get_profile(State(s): State<AppState>, AuthUser(user_id): AuthUser) -> Result<Json<Profile>> {
    Ok(Json(AccountRepository::new(&s.db).get_profile(user_id).await?))
}

async fn update_profile(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<ProfileInput>,
) -> Result<Json<Profile>> {
    Ok(Json(AccountRepository::new(&s.db).upsert_profile(user_id, &input).await?))
}

async fn list_addresses(State(s): State<AppState>, AuthUser(user_id): AuthUser) -> Result<Json<Vec<Address>>> {
    Ok(Json(AccountRepository::new(&s.db).list_addresses(user_id).await?))
}

async fn get_address(State(s): State<AppState>, AuthUser(user_id): AuthUser, Path(id): Path<Uuid>) -> Result<Json<Address>> {
    Ok(Json(AccountRepository::new(&s.db).get_address(user_id, id).await?))
}

async fn create_address(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<AddressInput>,
) -> Result<(StatusCode, Json<Address>)> {
    let address = AccountRepository::new(&s.db).create_address(user_id, &input).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<AddressInput>,
) -> Result<Json<Address>> {
    Ok(Json(AccountRepository::new(&s.db).update_address(user_id, id, &input).await?))
}

async fn delete_address(State(s): State<AppState>, AuthUser(user_id): AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    AccountRepository::new(&s.db).delete_address(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn with_items(repo: &OrderRepository<'_>, orders: Vec<OrderRecord>) -> Result<Vec<OrderWithItems>> {
    let mut out = Vec::with_capacity(orders.len());
    for order in orders {
        let items = repo.items_for(order.id).await?;
        out.push(OrderWithItems { order, items });
    }
    Ok(out)
}

async fn list_orders(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<PageParams>,
) -> Result<Json<PaginatedResponse<OrderWithItems>>> {
    let (page, per_page, offset) = page_window(p.page, p.per_page, 20);
    let repo = OrderRepository::new(&s.db);
    let filter = OrderFilter { status: None, user_id: Some(user_id), limit: i64::from(per_page), offset };
    let (orders, total) = repo.list(&filter).await?;
    let data = with_items(&repo, orders).await?;
    Ok(Json(PaginatedResponse { data, total, page, per_page }))
}

async fn get_order(State(s): State<AppState>, AuthUser(user_id): AuthUser, Path(id): Path<Uuid>) -> Result<Json<OrderWithItems>> {
    let repo = OrderRepository::new(&s.db);
    let order = repo.get_for_user(id, user_id).await?;
    let items = repo.items_for(order.id).await?;
    Ok(Json(OrderWithItems { order, items }))
}

async fn track_order(State(s): State<AppState>, AuthUser(user_id): AuthUser, Path(id): Path<Uuid>) -> Result<Json<OrderTracking>> {
    let order = OrderRepository::new(&s.db).get_for_user(id, user_id).await?;
    Ok(Json(OrderTracking::from(&order)))
}

async fn track_by_number(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_number): Path<String>,
) -> Result<Json<OrderTracking>> {
    let order = OrderRepository::new(&s.db).find_by_number(&order_number, user_id).await?;
    Ok(Json(OrderTracking::from(&order)))
}
