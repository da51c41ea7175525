//! SQLite pool bootstrap: migrations and the `db_version` mismatch-rotation rule from
//! spec.md 3/6.

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::RegicacheResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/oci");

/// Opens (creating if absent) the SQLite database at `db_path`, rotating aside any
/// existing file whose `db_version` does not match `expected_version`, then runs
/// migrations and ensures `db_version` is recorded.
pub async fn init_pool(db_path: impl AsRef<Path>, expected_version: &str) -> RegicacheResult<SqlitePool> {
    let db_path = db_path.as_ref();

    if db_path.exists() {
        if let Some(existing) = read_existing_version(db_path).await {
            if existing != expected_version {
                warn!(
                    found = %existing,
                    expected = %expected_version,
                    "db_version mismatch, rotating database aside"
                );
                rotate_aside(db_path)?;
            }
        }
    }

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new().max_connections(8).connect(&url).await?;

    MIGRATOR.run(&pool).await?;

    if sqlx::query("SELECT value FROM app_config WHERE key = 'db_version'")
        .fetch_optional(&pool)
        .await?
        .is_none()
    {
        sqlx::query("INSERT INTO app_config (key, value) VALUES ('db_version', ?)")
            .bind(expected_version)
            .execute(&pool)
            .await?;
        info!(version = %expected_version, "initialized fresh database");
    }

    Ok(pool)
}

async fn read_existing_version(path: &Path) -> Option<String> {
    let url = format!("sqlite://{}", path.display());
    let pool = SqlitePoolOptions::new().max_connections(1).connect(&url).await.ok()?;

    let row = sqlx::query("SELECT value FROM app_config WHERE key = 'db_version'")
        .fetch_optional(&pool)
        .await
        .ok()
        .flatten();

    pool.close().await;
    row.map(|r| r.get::<String, _>("value"))
}

fn rotate_aside(path: &Path) -> RegicacheResult<()> {
    let suffix = Utc::now().format("%Y%m%d_%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "regicache.db".to_owned());
    let renamed = path.with_file_name(format!("{file_name}.bak.{suffix}"));
    std::fs::rename(path, renamed)?;
    Ok(())
}

/// Parses a `TEXT` SQLite timestamp (`%Y-%m-%d %H:%M:%S`) into a UTC `DateTime`, falling
/// back to the current time if the column is unparseable (should not happen for rows this
/// store wrote itself).
pub fn parse_sqlite_datetime(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|_| Utc::now())
}
