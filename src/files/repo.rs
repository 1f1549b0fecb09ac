use async_trait::async_trait;

use crate::db::{PgStore, StoreError};
use crate::files::repo_types::{FileRecord, NewFileRecord};

/// Metadata persistence for stored files. The unique constraints on
/// `path` and `name` are the authority for collisions between concurrent
/// writers.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Fails with `StoreError::Conflict` if `path` or `name` is taken.
    async fn create(&self, new: NewFileRecord) -> Result<FileRecord, StoreError>;
    async fn find(&self, user_id: i64, id: i64) -> Result<FileRecord, StoreError>;
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<FileRecord>, StoreError>;
    async fn rename(
        &self,
        user_id: i64,
        id: i64,
        name: &str,
        list_name: &str,
    ) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
impl FileStore for PgStore {
    async fn create(&self, new: NewFileRecord) -> Result<FileRecord, StoreError> {
        let mut tx = self.pool().begin().await?;
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO files (user_id, name, list_name, extension, path, size, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, name, list_name, extension, path, size, created_at
            "#,
        )
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.list_name)
        .bind(&new.extension)
        .bind(&new.path)
        .bind(new.size)
        .bind(new.created_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn find(&self, user_id: i64, id: i64) -> Result<FileRecord, StoreError> {
        let record = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, user_id, name, list_name, extension, path, size, created_at
            FROM files
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(record)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, user_id, name, list_name, extension, path, size, created_at
            FROM files
            WHERE user_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn rename(
        &self,
        user_id: i64,
        id: i64,
        name: &str,
        list_name: &str,
    ) -> Result<(), StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE files
               SET name = $1, list_name = $2
             WHERE id = $3 AND user_id = $4
            "#,
        )
        .bind(name)
        .bind(list_name)
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
