//! Analysis session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_common::events::SessionStatusUpdate;
use vigil_common::{SessionKind, SessionStatus};

/// A bounded analysis episode grouping captures and detections for one owner
///
/// `jobs_total`/`jobs_finished`/`jobs_failed` form the completion counter:
/// the session turns terminal when `jobs_finished == jobs_total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    #[serde(rename = "user")]
    pub owner_id: i64,
    #[serde(rename = "session_type")]
    pub kind: SessionKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub metadata: Value,
    pub jobs_total: i64,
    pub jobs_finished: i64,
    pub jobs_failed: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// `analysis_update` payload for the current state
    pub fn status_update(&self) -> SessionStatusUpdate {
        SessionStatusUpdate {
            session_id: self.id,
            kind: self.kind,
            status: self.status,
            end_time: self.end_time,
            jobs_total: self.jobs_total,
            jobs_finished: self.jobs_finished,
            jobs_failed: self.jobs_failed,
            timestamp: Utc::now(),
        }
    }
}
