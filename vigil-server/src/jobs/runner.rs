//! Analysis job runner
//!
//! One job = one payload. Per job:
//! 1. resolve the target session (create, attach, or use a reserved slot)
//! 2. decode the payload, store media, insert the capture/source row
//! 3. classify; on a detected threat persist a detection and notify the owner
//! 4. settle the session slot through the completion counter
//!
//! Failures in steps 2-3 (including panics) fail the job's slot; they never
//! propagate past [`JobRunner::run`] as anything but a `JobError`.

use futures::FutureExt;
use serde_json::{json, Map, Value};
use sqlx::SqlitePool;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use vigil_common::events::Notification;
use vigil_common::{Modality, NotificationHub, SessionKind, SessionStatus};

use crate::db;
use crate::models::{text_detail, DetectionDetail, NewCapture, NewDetection, Session, Verdict};
use crate::services::media_store::decode_base64_payload;
use crate::services::{ClassifierError, MediaStore, ThreatClassifier};

/// Default `source_type` of text submissions
pub const DEFAULT_TEXT_SOURCE_TYPE: &str = "api";

/// Job errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Analysis session not found: {0}")]
    SessionNotFound(i64),

    #[error("Invalid payload: {0}")]
    Decode(String),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<vigil_common::Error> for JobError {
    fn from(err: vigil_common::Error) -> Self {
        JobError::Internal(err.to_string())
    }
}

/// Which session a job reports to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTarget {
    /// Create a new session of the payload's modality
    Implicit,
    /// Attach to an existing session of the owner
    Existing(i64),
    /// Use a slot reserved when the session was created
    Reserved(i64),
}

/// Raw submitted input
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    /// Base64 image
    Visual { image: String },
    /// Base64 audio plus optional transcription
    Audio {
        audio: String,
        transcription: Option<String>,
    },
    Text {
        text: String,
        source_type: Option<String>,
    },
}

impl AnalysisPayload {
    pub fn modality(&self) -> Modality {
        match self {
            AnalysisPayload::Visual { .. } => Modality::Visual,
            AnalysisPayload::Audio { .. } => Modality::Audio,
            AnalysisPayload::Text { .. } => Modality::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub task_id: Uuid,
    pub owner_id: i64,
    pub session: SessionTarget,
    pub payload: AnalysisPayload,
}

impl AnalysisJob {
    pub fn new(owner_id: i64, session: SessionTarget, payload: AnalysisPayload) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            owner_id,
            session,
            payload,
        }
    }
}

/// Executes analysis jobs
pub struct JobRunner {
    db: SqlitePool,
    classifier: Arc<dyn ThreatClassifier>,
    media: MediaStore,
    hub: NotificationHub,
}

impl JobRunner {
    pub fn new(
        db: SqlitePool,
        classifier: Arc<dyn ThreatClassifier>,
        media: MediaStore,
        hub: NotificationHub,
    ) -> Self {
        Self {
            db,
            classifier,
            media,
            hub,
        }
    }

    /// Run one job to completion
    pub async fn run(&self, job: &AnalysisJob) -> Result<Verdict, JobError> {
        let session = self.resolve_session(job).await?;

        tracing::info!(
            task_id = %job.task_id,
            session_id = session.id,
            owner_id = job.owner_id,
            modality = %job.payload.modality(),
            "Analysis job started"
        );

        let outcome = match AssertUnwindSafe(self.analyze(job, &session))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::Internal("analysis panicked".to_string())),
        };

        match &outcome {
            Ok(verdict) => tracing::info!(
                task_id = %job.task_id,
                session_id = session.id,
                detected = verdict.detected,
                "Analysis job finished"
            ),
            Err(e) => tracing::error!(
                task_id = %job.task_id,
                session_id = session.id,
                error = %e,
                "Analysis job failed"
            ),
        }

        if let Err(e) = self.settle_slot(session.id, job.owner_id, outcome.is_err()).await {
            tracing::error!(
                task_id = %job.task_id,
                session_id = session.id,
                error = %e,
                "Failed to record job outcome on session"
            );
        }

        outcome
    }

    /// Record one slot's outcome and announce a resulting status change
    pub async fn settle_slot(
        &self,
        session_id: i64,
        owner_id: i64,
        failed: bool,
    ) -> Result<Session, JobError> {
        let session = db::sessions::record_job_outcome(&self.db, session_id, failed).await?;

        if session.jobs_finished >= session.jobs_total && session.status.is_terminal() {
            tracing::info!(
                session_id,
                status = %session.status,
                jobs_failed = session.jobs_failed,
                "Session finished"
            );
            self.announce_status(owner_id, &session);
        }

        Ok(session)
    }

    /// Publish an `analysis_update` for a session
    pub fn announce_status(&self, owner_id: i64, session: &Session) {
        self.hub
            .publish(owner_id, Notification::SessionStatus(session.status_update()));
    }

    async fn resolve_session(&self, job: &AnalysisJob) -> Result<Session, JobError> {
        match job.session {
            SessionTarget::Implicit => {
                let modality = job.payload.modality();
                let session = db::sessions::create_session(
                    &self.db,
                    job.owner_id,
                    SessionKind::from(modality),
                    SessionStatus::Processing,
                    &json!({ "task_id": job.task_id }),
                    1,
                )
                .await?;
                self.announce_status(job.owner_id, &session);
                Ok(session)
            }
            SessionTarget::Existing(id) => {
                let session = db::sessions::attach_job(&self.db, id, job.owner_id)
                    .await?
                    .ok_or(JobError::SessionNotFound(id))?;
                self.announce_status(job.owner_id, &session);
                Ok(session)
            }
            SessionTarget::Reserved(id) => db::sessions::get_session(&self.db, id, job.owner_id)
                .await?
                .ok_or(JobError::SessionNotFound(id)),
        }
    }

    async fn analyze(&self, job: &AnalysisJob, session: &Session) -> Result<Verdict, JobError> {
        match &job.payload {
            AnalysisPayload::Text { text, source_type } => {
                let source = db::captures::insert_capture(
                    &self.db,
                    &NewCapture {
                        session_id: session.id,
                        owner_id: job.owner_id,
                        modality: Modality::Text,
                        media_ref: None,
                        content: Some(text.clone()),
                        source_type: Some(
                            source_type
                                .clone()
                                .unwrap_or_else(|| DEFAULT_TEXT_SOURCE_TYPE.to_string()),
                        ),
                        byte_len: text.len() as i64,
                        mime: Some("text/plain".to_string()),
                        metadata: json!({}),
                    },
                )
                .await?;

                let verdict = self.classifier.classify_text(text, None).await?;
                if verdict.detected {
                    let details = text_detail(source.id, text, &verdict.indicators);
                    self.record_detection(job, session, &verdict, details).await?;
                }
                Ok(verdict)
            }

            AnalysisPayload::Audio {
                audio,
                transcription,
            } => {
                let bytes = decode_base64_payload(audio).map_err(JobError::Decode)?;
                let stored = self.media.save(Modality::Audio, &bytes).await?;

                let mut metadata = Map::new();
                if let Some(t) = transcription {
                    metadata.insert("transcription".to_string(), Value::String(t.clone()));
                }

                let capture = db::captures::insert_capture(
                    &self.db,
                    &NewCapture {
                        session_id: session.id,
                        owner_id: job.owner_id,
                        modality: Modality::Audio,
                        media_ref: Some(stored.media_ref.clone()),
                        content: None,
                        source_type: None,
                        byte_len: stored.byte_len as i64,
                        mime: stored.mime.clone(),
                        metadata: Value::Object(metadata),
                    },
                )
                .await?;

                let verdict = self
                    .classifier
                    .classify_audio(transcription.as_deref().unwrap_or(""), None)
                    .await?;
                if verdict.detected {
                    let mut features = Map::new();
                    features.insert("byte_len".to_string(), json!(stored.byte_len));
                    features.insert("mime".to_string(), json!(stored.mime));

                    let details = DetectionDetail::Audio {
                        capture_id: capture.id,
                        start_offset: 0.0,
                        end_offset: None,
                        transcription: transcription.clone(),
                        features,
                    };
                    self.record_detection(job, session, &verdict, details).await?;
                }
                Ok(verdict)
            }

            AnalysisPayload::Visual { image } => {
                let bytes = decode_base64_payload(image).map_err(JobError::Decode)?;
                let stored = self.media.save(Modality::Visual, &bytes).await?;

                let capture = db::captures::insert_capture(
                    &self.db,
                    &NewCapture {
                        session_id: session.id,
                        owner_id: job.owner_id,
                        modality: Modality::Visual,
                        media_ref: Some(stored.media_ref),
                        content: None,
                        source_type: None,
                        byte_len: stored.byte_len as i64,
                        mime: stored.mime,
                        metadata: json!({}),
                    },
                )
                .await?;

                let verdict = self.classifier.classify_image(&bytes).await?;
                if verdict.detected {
                    let details = DetectionDetail::Visual {
                        capture_id: capture.id,
                        bounding_box: None,
                        detected_objects: Vec::new(),
                    };
                    self.record_detection(job, session, &verdict, details).await?;
                }
                Ok(verdict)
            }
        }
    }

    async fn record_detection(
        &self,
        job: &AnalysisJob,
        session: &Session,
        verdict: &Verdict,
        details: DetectionDetail,
    ) -> Result<(), JobError> {
        let detection = db::detections::insert_detection(
            &self.db,
            &NewDetection::from_verdict(job.owner_id, session.id, verdict, details),
        )
        .await?;

        tracing::warn!(
            task_id = %job.task_id,
            session_id = session.id,
            detection_id = detection.id,
            severity = %detection.severity,
            confidence = detection.confidence,
            "Threat detected"
        );

        let payload = serde_json::to_value(&detection)
            .map_err(|e| JobError::Internal(format!("Failed to serialize detection: {}", e)))?;
        self.hub.publish(job.owner_id, Notification::Detection(payload));

        Ok(())
    }
}
