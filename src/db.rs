//! SQLite connection pool for the vector collection (WAL mode, bounded waits).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.db_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(config.db_timeout())
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open vector store at {}", db_path.display()))?;

    Ok(pool)
}
