//! Raw input records
//!
//! One capture per job. Binary modalities keep a media reference (path
//! relative to the media directory); text keeps its content inline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use vigil_common::Modality;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capture {
    pub id: i64,
    pub session_id: i64,
    pub owner_id: i64,
    pub modality: Modality,
    pub media_ref: Option<String>,
    pub content: Option<String>,
    pub source_type: Option<String>,
    pub byte_len: i64,
    pub mime: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCapture {
    pub session_id: i64,
    pub owner_id: i64,
    pub modality: Modality,
    pub media_ref: Option<String>,
    pub content: Option<String>,
    pub source_type: Option<String>,
    pub byte_len: i64,
    pub mime: Option<String>,
    pub metadata: Value,
}
