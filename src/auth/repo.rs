use async_trait::async_trait;

use crate::auth::repo_types::User;
use crate::db::{PgStore, StoreError};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact-match lookup. Absence is `StoreError::NotFound`.
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError>;
    /// Fails with `StoreError::Conflict` when the username is taken.
    async fn create(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_username(&self, username: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_one(self.pool())
        .await?;
        Ok(user)
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(self.pool())
        .await?;
        Ok(user)
    }
}
