//! Detection review
//!
//! GET /detections, POST /detections/:id/review

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use super::auth::AuthUser;
use super::sessions::{clamp_limit, ListQuery};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::Detection;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub is_false_positive: Option<bool>,
}

/// GET /detections
pub async fn recent_detections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Detection>>> {
    let Query(query) = query?;
    let detections =
        db::detections::recent_detections(&state.db, user.id, clamp_limit(query.limit)).await?;
    Ok(Json(detections))
}

/// POST /detections/:id/review
///
/// Sets review metadata and the false-positive flag; never re-scores.
pub async fn review_detection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(detection_id): Path<i64>,
    request: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<Detection>> {
    let Json(request) = request?;
    let is_false_positive = request
        .is_false_positive
        .ok_or_else(|| ApiError::Validation("is_false_positive is required".to_string()))?;

    let detection = db::detections::mark_reviewed(
        &state.db,
        detection_id,
        user.id,
        user.id,
        is_false_positive,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Detection not found".to_string()))?;

    tracing::info!(
        owner_id = user.id,
        detection_id,
        is_false_positive,
        "Detection reviewed"
    );

    Ok(Json(detection))
}

pub fn detection_routes() -> Router<AppState> {
    Router::new()
        .route("/detections", get(recent_detections))
        .route("/detections/:detection_id/review", post(review_detection))
}
