use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use super::auth::AuthUser;
use super::AppState;
use crate::checkout::{place_order, CheckoutRequest};
use crate::models::OrderWithItems;
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout))
}

async fn checkout(
    State(s): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>)> {
    let placed = place_order(&s.db, &s.pricing, user_id, &r).await?;
    s.events.publish(placed.events).await;
    Ok((StatusCode::CREATED, Json(placed.order)))
}
