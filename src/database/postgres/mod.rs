//! Postgres implementation of the store traits.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate
//! builds without a live database.

mod auth;
mod crm;
mod documents;
mod loans;
mod messages;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::Profile;
use super::store::{ProfileStore, Store, StoreResult};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Maps unique violations to `Conflict`, everything else stays a sqlx error
fn conflict_or(err: sqlx::Error, what: impl Into<String>) -> DatabaseError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => DatabaseError::Conflict(what.into()),
        _ => DatabaseError::Sqlx(err),
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(profile)
    }

    async fn create_profile(&self, profile: Profile) -> StoreResult<Profile> {
        sqlx::query_as::<_, Profile>(
            r#"INSERT INTO profiles
                   (id, email, first_name, last_name, phone_number, role, permissions, monthly_income, company_id, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING *"#,
        )
        .bind(profile.id)
        .bind(&profile.email)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.phone_number)
        .bind(&profile.role)
        .bind(&profile.permissions)
        .bind(profile.monthly_income)
        .bind(profile.company_id)
        .bind(profile.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("profile {} already exists", profile.id)))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        DatabaseManager::health_check(&self.pool).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
