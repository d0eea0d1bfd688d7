//! Request identity.
//!
//! Authentication happens upstream; the gateway forwards the signed-in
//! user's id in `x-user-id`. Roles are looked up per request.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use super::AppState;
use crate::db::AccountRepository;
use crate::domain::value_objects::UserRole;
use crate::EcommerceError;

pub const USER_HEADER: &str = "x-user-id";

/// The signed-in user. Rejects with 401 when the header is missing or malformed.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .map(Self)
            .ok_or(EcommerceError::Unauthorized)
    }
}

async fn role_for(parts: &mut Parts, state: &AppState) -> Result<(Uuid, UserRole), EcommerceError> {
    let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;
    let role = AccountRepository::new(&state.db).role_of(user_id).await?;
    Ok((user_id, role))
}

/// A back-office user allowed to read (`admin_viewer` or `admin_manager`).
#[derive(Debug, Clone, Copy)]
pub struct AdminViewer(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AdminViewer {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (user_id, role) = role_for(parts, state).await?;
        if !role.can_view_admin() {
            tracing::warn!(%user_id, role = role.as_str(), "back-office read denied");
            return Err(EcommerceError::Forbidden);
        }
        Ok(Self(user_id))
    }
}

/// A back-office user allowed to write (`admin_manager`).
#[derive(Debug, Clone, Copy)]
pub struct AdminManager(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AdminManager {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (user_id, role) = role_for(parts, state).await?;
        if !role.can_manage() {
            tracing::warn!(%user_id, role = role.as_str(), "back-office write denied");
            return Err(EcommerceError::Forbidden);
        }
        Ok(Self(user_id))
    }
}
