use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
    SqlitePool,
};

/// Open the SQLite pool, creating the database file if needed, and apply
/// pending migrations.
#[tracing::instrument(skip_all)]
pub async fn establish_pool(database_url: &str) -> Result<SqlitePool> {
    tracing::debug!("establishing database connection to {database_url}");

    let opts = SqliteConnectOptions::from_str(database_url)
        .context("failed to parse database options")?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    if let Some(parent) = opts.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let pool = SqlitePool::connect_with(opts)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to apply migrations")?;

    Ok(pool)
}
