use super::user_repository::RepositoryResult;
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait GuestbookRepository: Send + Sync {
    async fn get_message(&self) -> RepositoryResult<Option<String>>;
    async fn upsert_message(&self, message: &str) -> RepositoryResult<()>;
}

pub struct SqliteGuestbookRepository {
    pool: SqlitePool,
}

impl SqliteGuestbookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuestbookRepository for SqliteGuestbookRepository {
    async fn get_message(&self) -> RepositoryResult<Option<String>> {
        let message = sqlx::query_scalar("SELECT message FROM guestbook WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn upsert_message(&self, message: &str) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guestbook (id, message) VALUES (1, ?)
            ON CONFLICT (id) DO UPDATE SET message = excluded.message, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
