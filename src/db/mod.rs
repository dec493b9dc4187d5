pub mod migrate;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::{fs, io, path::Path, str::FromStr};

pub use migrate::{MigrationError, MigrationRecord, MigrationReport, MigrationScript, Migrator};

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = database_path(database_url).and_then(|path| path.parent()) {
        if !parent.as_os_str().is_empty() {
            ensure_writable_dir(parent).map_err(|e| {
                sqlx::Error::Configuration(
                    format!(
                        "the data directory ('{}') is not writable: {}",
                        parent.display(),
                        e
                    )
                    .into(),
                )
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

fn database_path(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Creates `dir` if needed and proves it is writable by creating a probe file,
/// which gives a clearer failure than SQLite's "unable to open database file".
pub fn ensure_writable_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".writable");
    fs::File::create(&probe)?;
    fs::remove_file(&probe)
}
