//! Store initialization
//!
//! Creates the database (and its parent directory) on first run and applies
//! the schema idempotently, so a broadcaster can start against an empty
//! data directory.

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_orchestrators_table(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema, for tests and ephemeral runs
pub async fn init_database_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    create_orchestrators_table(&pool).await?;
    Ok(pool)
}

async fn create_orchestrators_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orchestrators (
            address TEXT PRIMARY KEY,
            service_uri TEXT NOT NULL,
            price_per_pixel INTEGER NOT NULL DEFAULT 0,
            activation_round INTEGER NOT NULL DEFAULT 0,
            deactivation_round INTEGER NOT NULL DEFAULT 0,
            stake INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
