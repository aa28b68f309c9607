//! vigil-server library interface
//!
//! Exposes the application state and router for the `vigil` binary and for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vigil_common::config::{AuthConfig, JobsConfig};
use vigil_common::events::DEFAULT_TOPIC_CAPACITY;
use vigil_common::NotificationHub;

use crate::jobs::{JobQueue, JobRunner, TaskRegistry};
use crate::services::{MediaStore, ThreatClassifier};

/// Token signing material and lifetimes
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Arc<str>,
    pub access_lifetime: chrono::Duration,
    pub refresh_lifetime: chrono::Duration,
}

impl TokenSettings {
    pub fn new(secret: String, config: &AuthConfig) -> Self {
        Self {
            secret: Arc::from(secret),
            access_lifetime: chrono::Duration::minutes(config.access_token_minutes),
            refresh_lifetime: chrono::Duration::hours(config.refresh_token_hours),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Per-owner notification fan-out
    pub hub: NotificationHub,
    /// Job submission handle and task records
    pub jobs: JobQueue,
    /// Shared with the workers; used for session status announcements
    pub runner: Arc<JobRunner>,
    pub tokens: TokenSettings,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the job pipeline and spawn its workers
    ///
    /// Returns the worker handles; they exit once `shutdown` is cancelled.
    pub fn start(
        db: SqlitePool,
        classifier: Arc<dyn ThreatClassifier>,
        media: MediaStore,
        jobs: &JobsConfig,
        tokens: TokenSettings,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let hub = NotificationHub::new(DEFAULT_TOPIC_CAPACITY);
        let runner = Arc::new(JobRunner::new(db.clone(), classifier, media, hub.clone()));

        let (queue, workers) = JobQueue::start(
            Arc::clone(&runner),
            TaskRegistry::new(jobs.task_retention),
            jobs.workers,
            jobs.queue_capacity,
            shutdown,
        );

        let state = Self {
            db,
            hub,
            jobs: queue,
            runner,
            tokens,
            startup_time: Utc::now(),
        };

        (state, workers)
    }
}

/// Build application router
///
/// /health, /auth/login, /auth/refresh and /ws/notifications are public (the
/// WebSocket handler authenticates itself); everything else requires a
/// bearer access token.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::user_routes())
        .merge(api::analyze_routes())
        .merge(api::results_routes())
        .merge(api::session_routes())
        .merge(api::detection_routes())
        .merge(api::dashboard_routes())
        .merge(api::task_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::require_auth,
        ));

    let public = Router::new()
        .merge(api::health_routes())
        .merge(api::token_routes())
        .merge(api::ws_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
}
