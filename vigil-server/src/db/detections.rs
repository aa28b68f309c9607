//! Detection database operations
//!
//! Severity, description and confidence are written once by
//! [`insert_detection`]; [`mark_reviewed`] touches only review columns.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use vigil_common::{Modality, Result, Severity};

use super::{parse_enum, parse_json, parse_optional_timestamp, parse_timestamp, to_json};
use crate::models::{Detection, NewDetection};

pub async fn insert_detection(pool: &SqlitePool, detection: &NewDetection) -> Result<Detection> {
    let indicators = to_json("indicators", &detection.indicators)?;
    let details = to_json("details", &detection.details)?;

    let row = sqlx::query(
        r#"
        INSERT INTO detections (
            owner_id, session_id, capture_id, modality, threat_level, threat_type,
            description, confidence_score, indicators, details, is_false_positive, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(detection.owner_id)
    .bind(detection.session_id)
    .bind(detection.details.capture_id())
    .bind(detection.details.modality().as_str())
    .bind(detection.severity.as_str())
    .bind(&detection.threat_type)
    .bind(&detection.description)
    .bind(detection.confidence)
    .bind(&indicators)
    .bind(&details)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    row_to_detection(&row)
}

/// Detections of one session, newest first
pub async fn list_for_session(
    pool: &SqlitePool,
    session_id: i64,
    owner_id: i64,
) -> Result<Vec<Detection>> {
    let rows = sqlx::query(
        "SELECT * FROM detections WHERE session_id = ? AND owner_id = ?
         ORDER BY created_at DESC, id DESC",
    )
    .bind(session_id)
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detection).collect()
}

/// Owner's most recent detections
pub async fn recent_detections(
    pool: &SqlitePool,
    owner_id: i64,
    limit: i64,
) -> Result<Vec<Detection>> {
    let rows = sqlx::query(
        "SELECT * FROM detections WHERE owner_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_detection).collect()
}

pub async fn get_detection(pool: &SqlitePool, id: i64, owner_id: i64) -> Result<Option<Detection>> {
    let row = sqlx::query("SELECT * FROM detections WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_detection).transpose()
}

/// Record a review: reviewer, time and false-positive flag
///
/// Idempotent apart from `reviewed_at`. Returns `None` when the detection does
/// not exist or belongs to another owner.
pub async fn mark_reviewed(
    pool: &SqlitePool,
    id: i64,
    owner_id: i64,
    reviewer_id: i64,
    is_false_positive: bool,
) -> Result<Option<Detection>> {
    let row = sqlx::query(
        r#"
        UPDATE detections SET reviewed_at = ?, reviewed_by = ?, is_false_positive = ?
        WHERE id = ? AND owner_id = ?
        RETURNING *
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(reviewer_id)
    .bind(is_false_positive)
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_detection).transpose()
}

/// Detection counts per severity; every severity present, zero when unseen
pub async fn count_by_severity(pool: &SqlitePool, owner_id: i64) -> Result<Vec<(Severity, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT threat_level, COUNT(*) FROM detections WHERE owner_id = ? GROUP BY threat_level",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut counts: Vec<(Severity, i64)> = Severity::ALL.iter().map(|s| (*s, 0)).collect();
    for (level, count) in rows {
        let severity: Severity = parse_enum("threat_level", &level)?;
        if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == severity) {
            entry.1 = count;
        }
    }
    Ok(counts)
}

/// Detection counts per modality; every modality present, zero when unseen
pub async fn count_by_modality(pool: &SqlitePool, owner_id: i64) -> Result<Vec<(Modality, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT modality, COUNT(*) FROM detections WHERE owner_id = ? GROUP BY modality",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let mut counts: Vec<(Modality, i64)> = Modality::ALL.iter().map(|m| (*m, 0)).collect();
    for (modality, count) in rows {
        let modality: Modality = parse_enum("modality", &modality)?;
        if let Some(entry) = counts.iter_mut().find(|(m, _)| *m == modality) {
            entry.1 = count;
        }
    }
    Ok(counts)
}

fn row_to_detection(row: &SqliteRow) -> Result<Detection> {
    let modality: String = row.try_get("modality")?;
    let threat_level: String = row.try_get("threat_level")?;
    let indicators: String = row.try_get("indicators")?;
    let details: String = row.try_get("details")?;
    let reviewed_at: Option<String> = row.try_get("reviewed_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Detection {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        session_id: row.try_get("session_id")?,
        severity: parse_enum("threat_level", &threat_level)?,
        description: row.try_get("description")?,
        threat_type: row.try_get("threat_type")?,
        indicators: parse_json("indicators", &indicators)?,
        modality: parse_enum("modality", &modality)?,
        confidence: row.try_get("confidence_score")?,
        is_false_positive: row.try_get("is_false_positive")?,
        reviewed_at: parse_optional_timestamp("reviewed_at", reviewed_at)?,
        reviewed_by: row.try_get("reviewed_by")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        details: parse_json("details", &details)?,
    })
}
