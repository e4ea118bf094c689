use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgStore;
use crate::database::models::RefreshTokenRecord;
use crate::database::store::{StoreResult, TokenStore};

#[async_trait]
impl TokenStore for PgStore {
    async fn record_refresh_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("INSERT INTO refresh_tokens (jti, user_id, expires_at, revoked) VALUES ($1, $2, $3, FALSE)")
            .bind(jti)
            .bind(user_id)
            .bind(expires_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, jti: Uuid) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, RefreshTokenRecord>("SELECT * FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1 AND revoked = FALSE")
            .bind(jti)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn blacklist_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO token_blacklist (jti, user_id, expires_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (jti) DO NOTHING"#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn is_blacklisted(&self, jti: Uuid) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM token_blacklist WHERE jti = $1)")
            .bind(jti)
            .fetch_one(self.pool())
            .await?;
        Ok(exists)
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await?;
        let blacklisted = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(blacklisted.rows_affected() + refresh.rows_affected())
    }
}
