use crate::auth::token::hash_token;
use crate::models::user::User;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Record already exists")]
    Conflict,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

const USER_COLUMNS: &str =
    "id, email, password_hash, verification_token, verified_at, CAST(created_at AS TEXT) AS created_at";

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    /// Inserts an unverified user. `verification_token` is the raw token;
    /// only its hash is stored.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> RepositoryResult<User>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;
    /// Consumes a verification token, returning the verified user's id.
    async fn verify_user(&self, verification_token: &str) -> RepositoryResult<i64>;
    /// Verifies a user without a token. Already verified users are left as is.
    async fn mark_verified(&self, id: i64) -> RepositoryResult<()>;
    /// Replaces the outstanding token of an unverified user.
    async fn replace_verification_token(
        &self,
        id: i64,
        verification_token: &str,
    ) -> RepositoryResult<()>;
    async fn delete_user(&self, id: i64) -> RepositoryResult<()>;
    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>>;
    async fn create_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> RepositoryResult<()>;
    /// Deletes an unexpired reset token and returns its owner.
    async fn consume_reset_token(&self, token: &str) -> RepositoryResult<i64>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(e: sqlx::Error) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::Database(e),
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> RepositoryResult<User> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, verification_token) VALUES (?, ?, ?) RETURNING {}",
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(password_hash)
            .bind(hash_token(verification_token))
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn verify_user(&self, verification_token: &str) -> RepositoryResult<i64> {
        // Single statement: two concurrent verifications cannot both match.
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET verification_token = NULL, verified_at = ?
            WHERE verification_token = ? AND verified_at IS NULL
            RETURNING id
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(hash_token(verification_token))
        .fetch_optional(&self.pool)
        .await?;

        id.ok_or(RepositoryError::NotFound)
    }

    async fn mark_verified(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET verification_token = NULL, verified_at = COALESCE(verified_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn replace_verification_token(
        &self,
        id: i64,
        verification_token: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET verification_token = ? WHERE id = ? AND verified_at IS NULL",
        )
        .bind(hash_token(verification_token))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete_user(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(limit.unwrap_or(100))
            .bind(offset.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn create_reset_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token_hash, user_id, expires_at) VALUES (?, ?, ?)",
        )
        .bind(hash_token(token))
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                RepositoryError::NotFound
            }
            _ => map_unique_violation(e),
        })?;

        Ok(())
    }

    async fn consume_reset_token(&self, token: &str) -> RepositoryResult<i64> {
        let user_id: Option<i64> = sqlx::query_scalar(
            r#"
            DELETE FROM password_reset_tokens
            WHERE token_hash = ? AND expires_at > ?
            RETURNING user_id
            "#,
        )
        .bind(hash_token(token))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        user_id.ok_or(RepositoryError::NotFound)
    }
}
