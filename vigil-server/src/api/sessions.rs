//! Session management
//!
//! POST /sessions, GET /sessions, POST /sessions/:id/end

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use vigil_common::{SessionKind, SessionStatus};

use super::auth::AuthUser;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::Session;
use crate::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// POST /sessions request
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "session_type")]
    pub kind: Option<SessionKind>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// Clamp a `limit` query parameter into 1..=MAX_LIST_LIMIT
pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// POST /sessions
///
/// Explicitly opens an `active` session that later submissions can attach to.
pub async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> ApiResult<Json<Session>> {
    let Json(request) = request?;

    let kind = request
        .kind
        .ok_or_else(|| ApiError::Validation("session_type is required".to_string()))?;

    let metadata = match request.metadata {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::Object(map)) => Value::Object(map),
        Some(_) => {
            return Err(ApiError::Validation(
                "metadata must be a JSON object".to_string(),
            ))
        }
    };

    let session = db::sessions::create_session(
        &state.db,
        user.id,
        kind,
        SessionStatus::Active,
        &metadata,
        0,
    )
    .await?;

    tracing::info!(owner_id = user.id, session_id = session.id, kind = %kind, "Session opened");

    Ok(Json(session))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Session>>> {
    let Query(query) = query?;
    let sessions = db::sessions::list_sessions(&state.db, user.id, clamp_limit(query.limit)).await?;
    Ok(Json(sessions))
}

/// POST /sessions/:id/end
pub async fn end_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<i64>,
) -> ApiResult<Json<Session>> {
    let session = db::sessions::end_session(&state.db, session_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Analysis session not found".to_string()))?;

    tracing::info!(owner_id = user.id, session_id, "Session ended");
    state.runner.announce_status(user.id, &session);

    Ok(Json(session))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/:session_id/end", post(end_session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(5)), 5);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIST_LIMIT);
    }
}
