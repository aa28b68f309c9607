//! Capture/source database operations

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use vigil_common::Result;

use super::{parse_enum, parse_json, parse_timestamp, to_json};
use crate::models::{Capture, NewCapture};

pub async fn insert_capture(pool: &SqlitePool, capture: &NewCapture) -> Result<Capture> {
    let metadata = to_json("metadata", &capture.metadata)?;

    let row = sqlx::query(
        r#"
        INSERT INTO captures (
            session_id, owner_id, modality, media_ref, content, source_type,
            byte_len, mime, metadata, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(capture.session_id)
    .bind(capture.owner_id)
    .bind(capture.modality.as_str())
    .bind(&capture.media_ref)
    .bind(&capture.content)
    .bind(&capture.source_type)
    .bind(capture.byte_len)
    .bind(&capture.mime)
    .bind(&metadata)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;

    row_to_capture(&row)
}

fn row_to_capture(row: &SqliteRow) -> Result<Capture> {
    let modality: String = row.try_get("modality")?;
    let metadata: String = row.try_get("metadata")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Capture {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        owner_id: row.try_get("owner_id")?,
        modality: parse_enum("modality", &modality)?,
        media_ref: row.try_get("media_ref")?,
        content: row.try_get("content")?,
        source_type: row.try_get("source_type")?,
        byte_len: row.try_get("byte_len")?,
        mime: row.try_get("mime")?,
        metadata: parse_json("metadata", &metadata)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}
