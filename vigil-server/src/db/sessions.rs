//! Analysis session database operations
//!
//! Status transitions driven by jobs go through the completion counter:
//! [`attach_job`] reserves a slot, [`record_job_outcome`] settles one. Each is
//! a single UPDATE, so concurrent jobs on one session never lose an outcome.

use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use vigil_common::{Result, SessionKind, SessionStatus};

use super::{parse_enum, parse_json, parse_optional_timestamp, parse_timestamp, to_json};
use crate::models::Session;

/// Insert a session
///
/// `start_time` is set here and never changes afterwards.
pub async fn create_session(
    pool: &SqlitePool,
    owner_id: i64,
    kind: SessionKind,
    status: SessionStatus,
    metadata: &Value,
    jobs_total: i64,
) -> Result<Session> {
    let now = Utc::now().to_rfc3339();
    let metadata = to_json("metadata", metadata)?;

    let row = sqlx::query(
        r#"
        INSERT INTO sessions (
            owner_id, kind, status, start_time, end_time, metadata,
            jobs_total, jobs_finished, jobs_failed, created_at, updated_at
        ) VALUES (?, ?, ?, ?, NULL, ?, ?, 0, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(kind.as_str())
    .bind(status.as_str())
    .bind(&now)
    .bind(&metadata)
    .bind(jobs_total)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;

    let session = row_to_session(&row)?;
    tracing::debug!(session_id = session.id, owner_id, kind = %kind, "Created session");
    Ok(session)
}

/// Load a session owned by `owner_id`
pub async fn get_session(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT * FROM sessions WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_session).transpose()
}

/// Most recent session of the owner, optionally of one kind
pub async fn latest_session(
    pool: &SqlitePool,
    owner_id: i64,
    kind: Option<SessionKind>,
) -> Result<Option<Session>> {
    let row = match kind {
        Some(kind) => {
            sqlx::query(
                "SELECT * FROM sessions WHERE owner_id = ? AND kind = ?
                 ORDER BY start_time DESC, id DESC LIMIT 1",
            )
            .bind(owner_id)
            .bind(kind.as_str())
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query(
                "SELECT * FROM sessions WHERE owner_id = ?
                 ORDER BY start_time DESC, id DESC LIMIT 1",
            )
            .bind(owner_id)
            .fetch_optional(pool)
            .await?
        }
    };

    row.as_ref().map(row_to_session).transpose()
}

/// Owner's sessions, newest first
pub async fn list_sessions(pool: &SqlitePool, owner_id: i64, limit: i64) -> Result<Vec<Session>> {
    let rows = sqlx::query(
        "SELECT * FROM sessions WHERE owner_id = ? ORDER BY start_time DESC, id DESC LIMIT ?",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_session).collect()
}

/// Reserve one job slot on an existing session
///
/// Moves the session to `processing` and clears `end_time`. Returns `None`
/// when the session does not exist or belongs to another owner.
pub async fn attach_job(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        UPDATE sessions SET
            jobs_total = jobs_total + 1,
            status = 'processing',
            end_time = NULL,
            updated_at = ?
        WHERE id = ? AND owner_id = ?
        RETURNING *
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_session).transpose()
}

/// Settle one job slot
///
/// When this was the last outstanding slot the session becomes `completed`
/// (no slot failed) or `failed`, and `end_time` is set. Returns the session
/// after the update.
pub async fn record_job_outcome(pool: &SqlitePool, id: i64, failed: bool) -> Result<Session> {
    let now = Utc::now().to_rfc3339();
    let failed = i64::from(failed);

    // SET expressions read the pre-update row
    let row = sqlx::query(
        r#"
        UPDATE sessions SET
            jobs_finished = jobs_finished + 1,
            jobs_failed = jobs_failed + ?1,
            status = CASE
                WHEN jobs_finished + 1 >= jobs_total THEN
                    CASE WHEN jobs_failed + ?1 > 0 THEN 'failed' ELSE 'completed' END
                ELSE status
            END,
            end_time = CASE
                WHEN jobs_finished + 1 >= jobs_total THEN ?2
                ELSE end_time
            END,
            updated_at = ?2
        WHERE id = ?3
        RETURNING *
        "#,
    )
    .bind(failed)
    .bind(&now)
    .bind(id)
    .fetch_one(pool)
    .await?;

    row_to_session(&row)
}

/// Explicitly end a session: `end_time` = now, status `completed`
///
/// Returns `None` when the session does not exist or belongs to another owner.
pub async fn end_session(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<Option<Session>> {
    let now = Utc::now().to_rfc3339();

    let row = sqlx::query(
        r#"
        UPDATE sessions SET end_time = ?, status = 'completed', updated_at = ?
        WHERE id = ? AND owner_id = ?
        RETURNING *
        "#,
    )
    .bind(&now)
    .bind(&now)
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_session).transpose()
}

/// Mark sessions left `processing` by a previous process as `interrupted`
///
/// Slots whose jobs died with that process are settled as failed, so a job
/// attached to the session later can still finish it. Called once at
/// startup, before workers run. Returns the number of sessions swept.
pub async fn mark_interrupted_sessions(pool: &SqlitePool) -> Result<u64> {
    let now = Utc::now().to_rfc3339();

    let result = sqlx::query(
        r#"
        UPDATE sessions SET
            status = 'interrupted',
            jobs_failed = jobs_failed + (jobs_total - jobs_finished),
            jobs_finished = jobs_total,
            end_time = ?,
            updated_at = ?
        WHERE status = 'processing'
        "#,
    )
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let swept = result.rows_affected();
    if swept > 0 {
        tracing::warn!(count = swept, "Marked unfinished sessions as interrupted");
    }

    Ok(swept)
}

fn row_to_session(row: &SqliteRow) -> Result<Session> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let start_time: String = row.try_get("start_time")?;
    let end_time: Option<String> = row.try_get("end_time")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Session {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        kind: parse_enum("kind", &kind)?,
        start_time: parse_timestamp("start_time", &start_time)?,
        end_time: parse_optional_timestamp("end_time", end_time)?,
        status: parse_enum("status", &status)?,
        metadata: parse_json("metadata", &metadata)?,
        jobs_total: row.try_get("jobs_total")?,
        jobs_finished: row.try_get("jobs_finished")?,
        jobs_failed: row.try_get("jobs_failed")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}
