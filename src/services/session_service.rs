use crate::auth::token::{generate_token, hash_token, CSRF_TOKEN_BYTES, SESSION_TOKEN_BYTES};
use crate::models::session::{ActiveSession, IssuedSession};
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use time::Duration;
use tracing::debug;

pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::hours(24);

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(FromRow)]
struct SessionRow {
    user_id: i64,
    csrf_token: String,
    expires_at: i64,
}

/// Owns the `sessions` table. Constructed once at startup and shared through
/// `AppState`.
pub struct SessionService {
    pool: SqlitePool,
    lifetime: Duration,
}

impl SessionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_lifetime(pool, DEFAULT_SESSION_LIFETIME)
    }

    pub fn with_lifetime(pool: SqlitePool, lifetime: Duration) -> Self {
        Self { pool, lifetime }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issues a session for `user_id`. The session identified by
    /// `previous_token`, if any, is deleted in the same transaction so a
    /// token planted before authentication never becomes authenticated.
    pub async fn establish(
        &self,
        previous_token: Option<&str>,
        user_id: i64,
    ) -> Result<IssuedSession, SessionError> {
        let mut tx = self.pool.begin().await?;

        if let Some(previous) = previous_token {
            delete_by_token(&mut tx, previous).await?;
        }
        let issued = self.insert(&mut tx, user_id).await?;

        tx.commit().await?;
        debug!(user_id, "session established");
        Ok(issued)
    }

    /// Returns the session for `token` if it exists and has not expired.
    pub async fn validate(&self, token: &str) -> Result<Option<ActiveSession>, SessionError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT user_id, csrf_token, expires_at FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(hash_token(token))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ActiveSession {
            user_id: r.user_id,
            csrf_token: r.csrf_token,
            expires_at: r.expires_at,
        }))
    }

    /// Replaces a valid session with a fresh token for the same user.
    /// Returns `None` when `token` is unknown or expired.
    pub async fn renew(&self, token: &str) -> Result<Option<IssuedSession>, SessionError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = sqlx::query_scalar(
            "DELETE FROM sessions WHERE token_hash = ? AND expires_at > ? RETURNING user_id",
        )
        .bind(hash_token(token))
        .bind(Utc::now().timestamp())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let issued = self.insert(&mut tx, user_id).await?;
        tx.commit().await?;
        debug!(user_id, "session renewed");
        Ok(Some(issued))
    }

    /// Deletes the session for `token`. Unknown tokens are not an error.
    pub async fn destroy(&self, token: &str) -> Result<(), SessionError> {
        let mut conn = self.pool.acquire().await?;
        delete_by_token(&mut conn, token).await?;
        Ok(())
    }

    pub async fn destroy_all_for_user(&self, user_id: i64) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<IssuedSession, SessionError> {
        let token = generate_token(SESSION_TOKEN_BYTES);
        let csrf_token = generate_token(CSRF_TOKEN_BYTES);
        let now = Utc::now().timestamp();
        let expires_at = now + self.lifetime.whole_seconds();

        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, csrf_token, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(&csrf_token)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(IssuedSession {
            token,
            csrf_token,
            user_id,
            expires_at,
        })
    }
}

async fn delete_by_token(conn: &mut SqliteConnection, token: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
