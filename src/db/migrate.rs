//! Versioned schema migrations.
//!
//! Each script is named `<version>_<description>.sql`. A run applies, in
//! ascending order, every script whose version is above the highest version
//! recorded in `schema_migrations`. The script body and its version record
//! are written in the same transaction, so a failing script leaves neither
//! behind.

use sqlx::{FromRow, SqlitePool};
use std::{collections::BTreeMap, fs, io, path::Path};
use tracing::{debug, info};

const CREATE_TRACKING_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

const EMBEDDED: &[(&str, &str)] = &[
    ("001_init.sql", include_str!("../../migrations/001_init.sql")),
    ("002_auth.sql", include_str!("../../migrations/002_auth.sql")),
    (
        "003_oauth_states.sql",
        include_str!("../../migrations/003_oauth_states.sql"),
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("error preparing schema_migrations: {0}")]
    Tracking(#[source] sqlx::Error),
    #[error("error reading migrations from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("migrations {first} and {second} share version {version}")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },
    #[error("error starting transaction for {name}: {source}")]
    Begin {
        name: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("error running migration {name}: {source}")]
    Apply {
        name: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("error recording version {version}: {source}")]
    Record {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("error committing migration {name}: {source}")]
    Commit {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub name: String,
    pub sql: String,
}

impl MigrationScript {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// Leading numeric token of the name, or `None` when the script is not
    /// a migration (e.g. `README.sql`).
    pub fn version(&self) -> Option<i64> {
        self.name
            .split('_')
            .next()
            .and_then(|prefix| prefix.parse::<i64>().ok())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub applied_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub starting_version: i64,
    pub applied: Vec<i64>,
}

impl MigrationReport {
    pub fn final_version(&self) -> i64 {
        self.applied
            .last()
            .copied()
            .unwrap_or(self.starting_version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Migrator {
    scripts: Vec<MigrationScript>,
}

impl Migrator {
    pub fn new(scripts: Vec<MigrationScript>) -> Self {
        Self { scripts }
    }

    /// The migrations compiled into the binary from `migrations/`.
    pub fn embedded() -> Self {
        Self::new(
            EMBEDDED
                .iter()
                .map(|(name, sql)| MigrationScript::new(*name, *sql))
                .collect(),
        )
    }

    /// Loads every `*.sql` file in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let dir = dir.as_ref();
        let read_err = |source| MigrationError::Read {
            path: dir.display().to_string(),
            source,
        };

        let mut scripts = Vec::new();
        for entry in fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let sql = fs::read_to_string(&path).map_err(|source| MigrationError::Read {
                path: path.display().to_string(),
                source,
            })?;
            scripts.push(MigrationScript::new(name, sql));
        }

        Ok(Self::new(scripts))
    }

    pub fn scripts(&self) -> &[MigrationScript] {
        &self.scripts
    }

    /// Versioned scripts in ascending order. Unversioned scripts are dropped.
    fn ordered(&self) -> Result<Vec<(i64, &MigrationScript)>, MigrationError> {
        let mut by_version: BTreeMap<i64, &MigrationScript> = BTreeMap::new();
        for script in &self.scripts {
            let Some(version) = script.version() else {
                debug!("Ignoring unversioned script {}", script.name);
                continue;
            };
            if let Some(existing) = by_version.insert(version, script) {
                return Err(MigrationError::DuplicateVersion {
                    version,
                    first: existing.name.clone(),
                    second: script.name.clone(),
                });
            }
        }
        Ok(by_version.into_iter().collect())
    }

    pub async fn run(&self, pool: &SqlitePool) -> Result<MigrationReport, MigrationError> {
        let ordered = self.ordered()?;

        ensure_tracking_table(pool).await?;

        let starting_version = current_version(pool).await?;
        let mut report = MigrationReport {
            starting_version,
            applied: Vec::new(),
        };

        for (version, script) in ordered {
            if version <= starting_version {
                continue;
            }

            info!("Running migration {}...", script.name);
            let mut tx = pool.begin().await.map_err(|source| MigrationError::Begin {
                name: script.name.clone(),
                source,
            })?;

            sqlx::raw_sql(&script.sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Apply {
                    name: script.name.clone(),
                    source,
                })?;

            sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Record { version, source })?;

            tx.commit().await.map_err(|source| MigrationError::Commit {
                name: script.name.clone(),
                source,
            })?;

            report.applied.push(version);
        }

        if report.applied.is_empty() {
            debug!("Schema is up to date at version {}", starting_version);
        } else {
            info!(
                "Schema migrated from version {} to {}",
                starting_version,
                report.final_version()
            );
        }

        Ok(report)
    }
}

async fn ensure_tracking_table(pool: &SqlitePool) -> Result<(), MigrationError> {
    sqlx::query(CREATE_TRACKING_TABLE)
        .execute(pool)
        .await
        .map_err(MigrationError::Tracking)?;
    Ok(())
}

/// Highest applied version, 0 on a store that has never been migrated.
pub async fn current_version(pool: &SqlitePool) -> Result<i64, MigrationError> {
    ensure_tracking_table(pool).await?;
    sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await
        .map_err(MigrationError::Tracking)
}

pub async fn applied(pool: &SqlitePool) -> Result<Vec<MigrationRecord>, MigrationError> {
    ensure_tracking_table(pool).await?;
    sqlx::query_as::<_, MigrationRecord>(
        "SELECT version, CAST(applied_at AS TEXT) AS applied_at FROM schema_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    .map_err(MigrationError::Tracking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap()
    }

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        count == 1
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(MigrationScript::new("001_init.sql", "").version(), Some(1));
        assert_eq!(MigrationScript::new("12_more_stuff.sql", "").version(), Some(12));
        assert_eq!(MigrationScript::new("init.sql", "").version(), None);
        assert_eq!(MigrationScript::new("v2_auth.sql", "").version(), None);
    }

    #[tokio::test]
    async fn test_fresh_store_reports_version_zero() {
        let pool = memory_pool().await;
        assert_eq!(current_version(&pool).await.unwrap(), 0);
        assert!(applied(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_applies_in_version_order() {
        let pool = memory_pool().await;
        let migrator = Migrator::new(vec![
            MigrationScript::new("002_b.sql", "CREATE TABLE b (a_id INTEGER REFERENCES a(id));"),
            MigrationScript::new("001_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
        ]);

        let report = migrator.run(&pool).await.unwrap();
        assert_eq!(report.applied, vec![1, 2]);
        assert_eq!(report.final_version(), 2);
        assert!(table_exists(&pool, "a").await);
        assert!(table_exists(&pool, "b").await);
    }

    #[tokio::test]
    async fn test_unversioned_scripts_are_ignored() {
        let pool = memory_pool().await;
        let migrator = Migrator::new(vec![
            MigrationScript::new("notes.sql", "THIS IS NOT SQL"),
            MigrationScript::new("001_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
        ]);

        let report = migrator.run(&pool).await.unwrap();
        assert_eq!(report.applied, vec![1]);
    }

    #[tokio::test]
    async fn test_duplicate_versions_are_rejected_before_running() {
        let pool = memory_pool().await;
        let migrator = Migrator::new(vec![
            MigrationScript::new("001_a.sql", "CREATE TABLE a (id INTEGER);"),
            MigrationScript::new("001_b.sql", "CREATE TABLE b (id INTEGER);"),
        ]);

        let err = migrator.run(&pool).await.unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateVersion { version: 1, .. }));
        assert!(!table_exists(&pool, "a").await);
    }

    #[tokio::test]
    async fn test_failed_script_leaves_no_record_or_partial_schema() {
        let pool = memory_pool().await;
        let migrator = Migrator::new(vec![
            MigrationScript::new("001_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
            MigrationScript::new(
                "002_broken.sql",
                "CREATE TABLE b (id INTEGER); INSERT INTO missing_table VALUES (1);",
            ),
            MigrationScript::new("003_c.sql", "CREATE TABLE c (id INTEGER);"),
        ]);

        let err = migrator.run(&pool).await.unwrap_err();
        assert!(matches!(err, MigrationError::Apply { ref name, .. } if name == "002_broken.sql"));

        assert_eq!(current_version(&pool).await.unwrap(), 1);
        assert!(table_exists(&pool, "a").await);
        assert!(!table_exists(&pool, "b").await);
        assert!(!table_exists(&pool, "c").await, "run must stop at the first failure");
    }

    #[tokio::test]
    async fn test_scripts_at_or_below_current_version_are_skipped() {
        let pool = memory_pool().await;
        Migrator::new(vec![MigrationScript::new(
            "005_a.sql",
            "CREATE TABLE a (id INTEGER);",
        )])
        .run(&pool)
        .await
        .unwrap();

        let report = Migrator::new(vec![
            MigrationScript::new("003_late.sql", "CREATE TABLE late (id INTEGER);"),
            MigrationScript::new("005_a.sql", "CREATE TABLE a (id INTEGER);"),
            MigrationScript::new("006_b.sql", "CREATE TABLE b (id INTEGER);"),
        ])
        .run(&pool)
        .await
        .unwrap();

        assert_eq!(report.starting_version, 5);
        assert_eq!(report.applied, vec![6]);
        assert!(!table_exists(&pool, "late").await);
    }

    #[tokio::test]
    async fn test_embedded_migrations_apply_cleanly() {
        let pool = memory_pool().await;
        let report = Migrator::embedded().run(&pool).await.unwrap();
        assert_eq!(report.applied, vec![1, 2, 3]);

        for table in ["users", "sessions", "password_reset_tokens", "oauth_states", "guestbook"] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }
}
