//! Profiles, roles, addresses and back-office user management.

use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use super::contains_pattern;
use crate::domain::value_objects::UserRole;
use crate::models::{Address, AdminUser, DashboardStats, Profile};
use crate::{EcommerceError, Result};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileInput {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 200))]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[serde(rename = "type")]
    pub kind: AddressKind,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub address_line1: String,
    #[validate(length(max = 200))]
    pub address_line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2))]
    pub country: String,
    #[validate(length(max = 30))]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Shipping,
    Billing,
}

impl AddressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shipping => "shipping",
            Self::Billing => "billing",
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

pub struct AccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Role of a user; accounts without a role row are plain users.
    pub async fn role_of(&self, user_id: Uuid) -> Result<UserRole> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(role.and_then(|r| r.parse().ok()).unwrap_or_default())
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Profile> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::UserNotFound)
    }

    /// Create or update the caller's profile. A new profile needs an email.
    pub async fn upsert_profile(&self, user_id: Uuid, input: &ProfileInput) -> Result<Profile> {
        input.validate()?;
        let updated = sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET email = COALESCE($2, email), full_name = COALESCE($3, full_name), updated_at = NOW()
             WHERE user_id = $1 RETURNING *",
        )
        .bind(user_id)
        .bind(&input.email)
        .bind(&input.full_name)
        .fetch_optional(self.pool)
        .await?;
        if let Some(profile) = updated {
            return Ok(profile);
        }
        let email = input.email.as_deref().ok_or_else(|| EcommerceError::Validation("email is required".to_string()))?;
        Ok(sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, user_id, email, full_name) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(email)
        .bind(&input.full_name)
        .fetch_one(self.pool)
        .await?)
    }

    /// Addresses of a user, default first.
    pub async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<Address>> {
        Ok(sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn get_address(&self, user_id: Uuid, id: Uuid) -> Result<Address> {
        sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(EcommerceError::AddressNotFound)
    }

    pub async fn create_address(&self, user_id: Uuid, input: &AddressInput) -> Result<Address> {
        input.validate()?;
        let mut tx = self.pool.begin().await?;
        if input.is_default {
            sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND is_default")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        let address = sqlx::query_as::<_, Address>(
            "INSERT INTO addresses (id, user_id, type, first_name, last_name, company, address_line1, address_line2,
                                    city, state, postal_code, country, phone, is_default)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(input.kind.as_str())
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.company)
        .bind(&input.address_line1)
        .bind(&input.address_line2)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(input.country.to_uppercase())
        .bind(&input.phone)
        .bind(input.is_default)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(address)
    }

    pub async fn update_address(&self, user_id: Uuid, id: Uuid, input: &AddressInput) -> Result<Address> {
        input.validate()?;
        let mut tx = self.pool.begin().await?;
        if input.is_default {
            sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2 AND is_default")
                .bind(user_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        let address = sqlx::query_as::<_, Address>(
            "UPDATE addresses SET type = $3, first_name = $4, last_name = $5, company = $6, address_line1 = $7,
                    address_line2 = $8, city = $9, state = $10, postal_code = $11, country = $12, phone = $13,
                    is_default = $14, updated_at = NOW()
             WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .bind(input.kind.as_str())
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.company)
        .bind(&input.address_line1)
        .bind(&input.address_line2)
        .bind(&input.city)
        .bind(&input.state)
        .bind(&input.postal_code)
        .bind(input.country.to_uppercase())
        .bind(&input.phone)
        .bind(input.is_default)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(EcommerceError::AddressNotFound)?;
        tx.commit().await?;
        Ok(address)
    }

    pub async fn delete_address(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(EcommerceError::AddressNotFound);
        }
        Ok(())
    }

    pub async fn list_users(&self, filter: &UserFilter) -> Result<(Vec<AdminUser>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM profiles p LEFT JOIN user_roles r ON r.user_id = p.user_id WHERE TRUE",
        );
        Self::push_user_filters(&mut count, filter);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.user_id, p.email, p.full_name, COALESCE(r.role, 'user') AS role, p.created_at
             FROM profiles p LEFT JOIN user_roles r ON r.user_id = p.user_id WHERE TRUE",
        );
        Self::push_user_filters(&mut query, filter);
        query.push(" ORDER BY p.created_at DESC LIMIT ").push_bind(filter.limit).push(" OFFSET ").push_bind(filter.offset);
        let users = query.build_query_as::<AdminUser>().fetch_all(self.pool).await?;
        Ok((users, total))
    }

    fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
        if let Some(role) = filter.role {
            builder.push(" AND COALESCE(r.role, 'user') = ").push_bind(role.as_str());
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = contains_pattern(search);
            builder
                .push(" AND (p.email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.full_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    pub async fn set_role(&self, user_id: Uuid, role: UserRole) -> Result<()> {
        self.get_profile(user_id).await?;
        sqlx::query(
            "INSERT INTO user_roles (id, user_id, role) VALUES ($1, $2, $3)
             ON CONFLICT (user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(role.as_str())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Remove a user's profile, role and addresses. Orders are kept.
    pub async fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM addresses WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        let result = sqlx::query("DELETE FROM profiles WHERE user_id = $1").bind(user_id).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(EcommerceError::UserNotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        let (total_users, new_users_last_7_days) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') FROM profiles",
        )
        .fetch_one(self.pool)
        .await?;
        let (total_products,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM products").fetch_one(self.pool).await?;
        let (total_categories,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM categories").fetch_one(self.pool).await?;
        let (total_orders, revenue) = sqlx::query_as::<_, (i64, rust_decimal::Decimal)>(
            "SELECT COUNT(*), COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0) FROM orders",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(DashboardStats { total_users, total_products, total_categories, new_users_last_7_days, total_orders, revenue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(kind: AddressKind) -> AddressInput {
        AddressInput {
            kind, first_name: "Maya".into(), last_name: "Shrestha".into(), company: None,
            address_line1: "12 Durbar Marg".into(), address_line2: None, city: "Kathmandu".into(),
            state: "Bagmati".into(), postal_code: "44600".into(), country: "np".into(), phone: None, is_default: true,
        }
    }

    #[test]
    fn test_address_validation() {
        assert!(address(AddressKind::Shipping).validate().is_ok());
        let mut missing_city = address(AddressKind::Billing);
        missing_city.city = String::new();
        assert!(missing_city.validate().is_err());
    }

    #[test]
    fn test_address_kind_from_json() {
        let kind: AddressKind = serde_json::from_str(r#""billing""#).unwrap();
        assert_eq!(kind.as_str(), "billing");
        assert!(serde_json::from_str::<AddressKind>(r#""warehouse""#).is_err());
    }

    #[test]
    fn test_profile_email_validation() {
        let input = ProfileInput { email: Some("not-an-email".into()), full_name: None };
        assert!(input.validate().is_err());
        let input = ProfileInput { email: None, full_name: Some("Maya Shrestha".into()) };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_user_filter_sql() {
        let filter = UserFilter { role: Some(UserRole::AdminViewer), search: Some(" maya ".into()), limit: 10, offset: 0 };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM profiles p WHERE TRUE");
        AccountRepository::push_user_filters(&mut builder, &filter);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM profiles p WHERE TRUE AND COALESCE(r.role, 'user') = $1 AND (p.email ILIKE $2 OR p.full_name ILIKE $3)"
        );
    }
}
