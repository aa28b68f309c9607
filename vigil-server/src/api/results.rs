//! Analysis results
//!
//! GET /results (latest session, optionally of one kind) and
//! GET /results/:session_id.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use vigil_common::SessionKind;

use super::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Detection, Session};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    /// visual, audio, text, multimodal or all (default)
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub session: Session,
    pub threats: Vec<Detection>,
}

/// GET /results
pub async fn latest_results(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ResultsQuery>, QueryRejection>,
) -> ApiResult<Json<ResultsResponse>> {
    let Query(query) = query?;

    let kind = match query.kind.as_deref() {
        None | Some("all") => None,
        Some(other) => Some(
            other
                .parse::<SessionKind>()
                .map_err(|e| ApiError::Validation(e.to_string()))?,
        ),
    };

    let session = db::sessions::latest_session(&state.db, user.id, kind)
        .await?
        .ok_or_else(|| ApiError::NotFound("No analysis sessions found".to_string()))?;

    results_for(&state, user, session).await
}

/// GET /results/:session_id
pub async fn session_results(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<ResultsResponse>> {
    let session = db::sessions::get_session(&state.db, session_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Analysis session not found".to_string()))?;

    results_for(&state, user, session).await
}

async fn results_for(
    state: &AppState,
    user: AuthUser,
    session: Session,
) -> ApiResult<Json<ResultsResponse>> {
    let threats = db::detections::list_for_session(&state.db, session.id, user.id).await?;
    Ok(Json(ResultsResponse { session, threats }))
}

pub fn results_routes() -> Router<AppState> {
    Router::new()
        .route("/results", get(latest_results))
        .route("/results/:session_id", get(session_results))
}
