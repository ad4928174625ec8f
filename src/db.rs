use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::queries::ddl;

/// Open a file-based database pool for production use
/// Enables WAL mode and foreign keys, creating the file if missing
pub async fn open_database_pool(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    println!("SQLite database: {}", db_path.display());
    Ok(pool)
}

/// Create tables and indexes if they do not exist yet
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(&ddl::create_sessions_table())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_suggested_tasks_table())
        .execute(pool)
        .await?;

    sqlx::query(&ddl::create_sessions_created_at_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_sessions_artifact_hash_index())
        .execute(pool)
        .await?;
    sqlx::query(&ddl::create_suggested_tasks_status_index())
        .execute(pool)
        .await?;

    Ok(())
}

/// Create an in-memory database pool for testing
/// Pool is capped at one connection so every query sees the same database
pub async fn create_test_pool_in_memory() -> SqlitePool {
    let options =
        SqliteConnectOptions::from_str("sqlite::memory:").expect("Valid in-memory options");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory database");
    init_database_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Create a file-based database pool in a temporary directory for testing
/// The returned guard keeps the directory alive for the test's duration
pub async fn create_test_pool_in_temporary_file(
) -> Result<(SqlitePool, tempfile::TempDir), Box<dyn std::error::Error>> {
    let guard = tempfile::tempdir()?;
    let db_path = guard.path().join("test.sqlite");
    let pool = open_database_pool(&db_path).await?;
    init_database_schema(&pool).await?;
    Ok((pool, guard))
}
