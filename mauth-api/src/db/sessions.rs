//! Movement session persistence
//!
//! A session groups the traces submitted in one request. Training sessions feed
//! the trainer; verification attempts are kept as non-training sessions for
//! audit.

use anyhow::{Context, Result};
use chrono::Utc;
use mauth_core::{extract, MovementTrace, StoredTrace, UserId};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Insert a session and its sequences in one transaction
pub async fn save_session(
    pool: &SqlitePool,
    user_id: UserId,
    is_training_data: bool,
    traces: &[MovementTrace],
) -> Result<Uuid> {
    // Serialize everything before taking a connection
    let rows = traces
        .iter()
        .map(|trace| -> serde_json::Result<(String, String)> {
            Ok((
                serde_json::to_string(trace)?,
                serde_json::to_string(&extract(trace))?,
            ))
        })
        .collect::<serde_json::Result<Vec<_>>>()
        .context("Failed to serialize trace")?;

    let session_id = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO movement_sessions (session_id, user_id, is_training_data, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(session_id.to_string())
    .bind(user_id.get())
    .bind(is_training_data)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    for (points, features) in &rows {
        sqlx::query("INSERT INTO movement_sequences (session_id, points, features) VALUES (?, ?, ?)")
            .bind(session_id.to_string())
            .bind(points)
            .bind(features)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(session_id)
}

/// Store labeled training traces for `user_id`
pub async fn save_training_session(
    pool: &SqlitePool,
    user_id: UserId,
    traces: &[MovementTrace],
) -> Result<Uuid> {
    save_session(pool, user_id, true, traces).await
}

/// Keep a verified trace and its claimed identity as a non-training session
pub async fn record_verification_attempt(
    pool: &SqlitePool,
    claimed: UserId,
    trace: &MovementTrace,
) -> Result<Uuid> {
    save_session(pool, claimed, false, std::slice::from_ref(trace)).await
}

/// Every training-flagged sequence, oldest first
pub async fn load_training_traces(pool: &SqlitePool) -> Result<Vec<StoredTrace>> {
    let rows = sqlx::query(
        r#"
        SELECT q.id, s.user_id, q.points
        FROM movement_sequences q
        JOIN movement_sessions s ON s.session_id = q.session_id
        WHERE s.is_training_data = 1
        ORDER BY q.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: i64 = row.get("id");
            let points: String = row.get("points");
            let trace: MovementTrace = serde_json::from_str(&points)
                .with_context(|| format!("Stored sequence {} is not a valid trace", id))?;
            Ok(StoredTrace {
                user_id: UserId(row.get("user_id")),
                is_training_data: true,
                trace,
            })
        })
        .collect()
}
