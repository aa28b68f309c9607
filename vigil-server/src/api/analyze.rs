//! Analysis submission endpoints
//!
//! POST /analyze/{visual,audio,text,multimodal}. Each validates its body,
//! enqueues work and returns immediately; nothing here awaits a job.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use vigil_common::{Modality, SessionKind, SessionStatus};

use super::auth::{required, AuthUser};
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{AnalysisJob, AnalysisPayload, EnqueueError, SessionTarget};
use crate::AppState;

const PROCESSING: &str = "processing";

/// POST /analyze/visual request
#[derive(Debug, Deserialize)]
pub struct VisualRequest {
    pub image: Option<String>,
    pub session_id: Option<i64>,
}

/// POST /analyze/audio request
#[derive(Debug, Deserialize)]
pub struct AudioRequest {
    pub audio: Option<String>,
    pub transcription: Option<String>,
    pub session_id: Option<i64>,
}

/// POST /analyze/text request
#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: Option<String>,
    pub source_type: Option<String>,
    pub session_id: Option<i64>,
}

/// POST /analyze/multimodal request; at least one of text/image/audio
#[derive(Debug, Deserialize)]
pub struct MultimodalRequest {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub transcription: Option<String>,
}

/// Single-job submission response
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub task_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TaskHandle {
    #[serde(rename = "type")]
    pub modality: Modality,
    pub task_id: Uuid,
}

/// POST /analyze/multimodal response
#[derive(Debug, Serialize)]
pub struct MultimodalResponse {
    pub message: String,
    pub session_id: i64,
    pub tasks: Vec<TaskHandle>,
    pub status: &'static str,
}

/// POST /analyze/visual
pub async fn analyze_visual(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Result<Json<VisualRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = request?;
    let image = required(request.image, "image")?;

    submit(
        &state,
        user,
        request.session_id,
        AnalysisPayload::Visual { image },
    )
    .await
}

/// POST /analyze/audio
pub async fn analyze_audio(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Result<Json<AudioRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = request?;
    let audio = required(request.audio, "audio")?;

    submit(
        &state,
        user,
        request.session_id,
        AnalysisPayload::Audio {
            audio,
            transcription: request.transcription,
        },
    )
    .await
}

/// POST /analyze/text
pub async fn analyze_text(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Result<Json<TextRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponse>> {
    let Json(request) = request?;
    let text = required(request.text, "text")?;

    submit(
        &state,
        user,
        request.session_id,
        AnalysisPayload::Text {
            text,
            source_type: request.source_type,
        },
    )
    .await
}

/// POST /analyze/multimodal
///
/// Creates one `multimodal` session with a slot reserved for every payload,
/// then enqueues one job per payload in text, visual, audio order.
pub async fn analyze_multimodal(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    request: Result<Json<MultimodalRequest>, JsonRejection>,
) -> ApiResult<Json<MultimodalResponse>> {
    let Json(request) = request?;

    let mut payloads = Vec::new();
    if let Some(text) = request.text.filter(|t| !t.is_empty()) {
        payloads.push(AnalysisPayload::Text {
            text,
            source_type: None,
        });
    }
    if let Some(image) = request.image.filter(|i| !i.is_empty()) {
        payloads.push(AnalysisPayload::Visual { image });
    }
    if let Some(audio) = request.audio.filter(|a| !a.is_empty()) {
        payloads.push(AnalysisPayload::Audio {
            audio,
            transcription: request.transcription,
        });
    }

    if payloads.is_empty() {
        return Err(ApiError::Validation(
            "At least one of text, image or audio is required".to_string(),
        ));
    }

    let modalities: Vec<Modality> = payloads.iter().map(AnalysisPayload::modality).collect();
    let session = db::sessions::create_session(
        &state.db,
        user.id,
        SessionKind::Multimodal,
        SessionStatus::Processing,
        &json!({ "modalities": modalities }),
        payloads.len() as i64,
    )
    .await?;
    state.runner.announce_status(user.id, &session);

    tracing::info!(
        owner_id = user.id,
        session_id = session.id,
        jobs = payloads.len(),
        "Multimodal analysis submitted"
    );

    let mut tasks = Vec::with_capacity(payloads.len());
    let mut pending = payloads.into_iter();

    while let Some(payload) = pending.next() {
        let modality = payload.modality();
        let job = AnalysisJob::new(user.id, SessionTarget::Reserved(session.id), payload);

        match state.jobs.enqueue(job).await {
            Ok(task_id) => tasks.push(TaskHandle { modality, task_id }),
            Err(err) => {
                // The rejected slot is already settled; settle the rest
                for _ in pending.by_ref() {
                    if let Err(e) = state.runner.settle_slot(session.id, user.id, true).await {
                        tracing::error!(session_id = session.id, error = %e, "Failed to release job slot");
                    }
                }
                return Err(enqueue_error(err));
            }
        }
    }

    Ok(Json(MultimodalResponse {
        message: "Multimodal analysis tasks submitted successfully".to_string(),
        session_id: session.id,
        tasks,
        status: PROCESSING,
    }))
}

async fn submit(
    state: &AppState,
    user: AuthUser,
    session_id: Option<i64>,
    payload: AnalysisPayload,
) -> ApiResult<Json<SubmitResponse>> {
    let target = match session_id {
        Some(id) => {
            if db::sessions::get_session(&state.db, id, user.id).await?.is_none() {
                return Err(ApiError::NotFound(format!("Analysis session not found: {}", id)));
            }
            SessionTarget::Existing(id)
        }
        None => SessionTarget::Implicit,
    };

    let modality = payload.modality();
    let task_id = state
        .jobs
        .enqueue(AnalysisJob::new(user.id, target, payload))
        .await
        .map_err(enqueue_error)?;

    tracing::info!(
        owner_id = user.id,
        task_id = %task_id,
        modality = %modality,
        "Analysis submitted"
    );

    Ok(Json(SubmitResponse {
        message: format!("{} analysis task submitted successfully", capitalized(modality)),
        task_id,
        status: PROCESSING,
    }))
}

fn enqueue_error(err: EnqueueError) -> ApiError {
    ApiError::ServiceUnavailable(format!("{}, try again later", err))
}

fn capitalized(modality: Modality) -> &'static str {
    match modality {
        Modality::Visual => "Visual",
        Modality::Audio => "Audio",
        Modality::Text => "Text",
    }
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze/visual", post(analyze_visual))
        .route("/analyze/audio", post(analyze_audio))
        .route("/analyze/text", post(analyze_text))
        .route("/analyze/multimodal", post(analyze_multimodal))
}
