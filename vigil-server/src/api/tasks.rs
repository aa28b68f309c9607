//! Task polling
//!
//! GET /tasks/:task_id

use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::jobs::TaskRecord;
use crate::AppState;

/// GET /tasks/:task_id
///
/// Records of other owners, evicted records and unknown ids are all 404.
pub async fn task_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskRecord>> {
    state
        .jobs
        .tasks()
        .get(task_id, user.id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {}", task_id)))
}

pub fn task_routes() -> Router<AppState> {
    Router::new().route("/tasks/:task_id", get(task_status))
}
