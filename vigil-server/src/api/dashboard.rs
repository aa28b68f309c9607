//! Dashboard summary
//!
//! GET /dashboard

use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use vigil_common::{Modality, SessionKind};

use super::auth::AuthUser;
use crate::db;
use crate::error::ApiResult;
use crate::models::Detection;
use crate::AppState;

/// Detections shown on the dashboard
pub const RECENT_THREATS: i64 = 10;

/// Status reported for a modality with no session yet
pub const INACTIVE: &str = "inactive";

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub threats: Vec<Detection>,
    /// Keyed by severity (LOW..CRITICAL); includes false positives
    pub threat_counts: BTreeMap<&'static str, i64>,
    /// Keyed by modality
    pub source_counts: BTreeMap<&'static str, i64>,
    /// Latest session status per modality, `inactive` when none
    pub session_status: BTreeMap<&'static str, String>,
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<DashboardResponse>> {
    let threats = db::detections::recent_detections(&state.db, user.id, RECENT_THREATS).await?;

    let threat_counts = db::detections::count_by_severity(&state.db, user.id)
        .await?
        .into_iter()
        .map(|(severity, count)| (severity.as_str(), count))
        .collect();

    let source_counts = db::detections::count_by_modality(&state.db, user.id)
        .await?
        .into_iter()
        .map(|(modality, count)| (modality.as_str(), count))
        .collect();

    let mut session_status = BTreeMap::new();
    for modality in Modality::ALL {
        let latest =
            db::sessions::latest_session(&state.db, user.id, Some(SessionKind::from(modality)))
                .await?;
        let status = latest
            .map(|session| session.status.to_string())
            .unwrap_or_else(|| INACTIVE.to_string());
        session_status.insert(modality.as_str(), status);
    }

    Ok(Json(DashboardResponse {
        threats,
        threat_counts,
        source_counts,
        session_status,
    }))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}
