pub mod test_helpers {
    use crate::config::session::SessionConfig;
    use crate::db::Migrator;
    use crate::middleware::csrf::CsrfGuard;
    use crate::services::email_service::RecordingMailer;
    use crate::services::mail_queue::{MailQueue, MailWorkers, TracingDeliveryObserver};
    use crate::AppState;
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    pub const TEST_BASE_URL: &str = "http://localhost:3000";

    /// Application state over `pool` whose outgoing mail lands in `mailer`.
    pub struct TestApp {
        pub state: AppState,
        pub mailer: RecordingMailer,
        pub workers: MailWorkers,
    }

    impl TestApp {
        pub fn new(pool: SqlitePool) -> Self {
            Self::with_csrf(pool, CsrfGuard::default())
        }

        pub fn with_csrf(pool: SqlitePool, csrf: CsrfGuard) -> Self {
            let mailer = RecordingMailer::new();
            let (queue, workers) = MailQueue::spawn(
                Arc::new(mailer.clone()),
                Arc::new(TracingDeliveryObserver),
                16,
                1,
            );
            let state = AppState::new(
                pool,
                queue,
                TEST_BASE_URL,
                SessionConfig::development(),
                csrf,
            );
            Self {
                state,
                mailer,
                workers,
            }
        }

        /// Waits up to two seconds for `count` messages to be delivered.
        pub async fn wait_for_mail(&self, count: usize) -> Vec<crate::services::email_service::SentMessage> {
            for _ in 0..200 {
                let sent = self.mailer.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            self.mailer.sent()
        }
    }

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        Migrator::embedded()
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;

        Ok(pool)
    }

    /// Create a temporary file-based SQLite database for testing
    /// Useful when several connections must see the same data
    pub async fn create_test_db_file(
        max_connections: u32,
    ) -> Result<(SqlitePool, NamedTempFile), sqlx::Error> {
        let temp_file = NamedTempFile::new().map_err(sqlx::Error::Io)?;
        let db_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| sqlx::Error::Configuration("Invalid database path".into()))?;
        let database_url = format!("sqlite://{}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await?;

        Migrator::embedded()
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;

        Ok((pool, temp_file))
    }

    /// Insert a test user with hashed password. An unverified user's raw
    /// verification token is its email address.
    pub async fn insert_test_user(
        pool: &SqlitePool,
        email: &str,
        password: &str,
        verified: bool,
    ) -> Result<i64, sqlx::Error> {
        let password_hash = crate::auth::password::hash_password(password)
            .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;

        let (token, verified_at) = if verified {
            (None, Some(chrono::Utc::now().to_rfc3339()))
        } else {
            (Some(crate::auth::token::hash_token(email)), None)
        };

        let id = sqlx::query_scalar(
            "INSERT INTO users (email, password_hash, verification_token, verified_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(token)
        .bind(verified_at)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    pub async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
    }
}

// Re-export commonly used test functions at module level for convenience
// Note: This is test-only code. Panic on error is acceptable in tests.
#[cfg(test)]
pub async fn create_test_pool() -> sqlx::SqlitePool {
    match test_helpers::create_test_db().await {
        Ok(pool) => pool,
        Err(e) => panic!("Failed to create test pool: {}", e),
    }
}

#[cfg(test)]
pub async fn create_test_user(
    pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
) -> Result<i64, sqlx::Error> {
    test_helpers::insert_test_user(pool, email, password, true).await
}
