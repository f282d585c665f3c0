//! Database access for mauth-api

pub mod sessions;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the SQLite database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the session and sequence tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movement_sessions (
            session_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            is_training_data INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movement_sequences (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL
                REFERENCES movement_sessions(session_id) ON DELETE CASCADE,
            points TEXT NOT NULL,
            features TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_movement_sequences_session ON movement_sequences(session_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (movement_sessions, movement_sequences)");

    Ok(())
}
