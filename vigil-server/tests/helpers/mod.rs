//! Shared fixtures for vigil-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;
use uuid::Uuid;
use vigil_common::api::{hash_password, issue_token, TokenClaims, TokenKind};
use vigil_common::config::{AuthConfig, JobsConfig};
use vigil_common::Severity;
use vigil_server::db::users::{create_user, NewUser};
use vigil_server::jobs::TaskRecord;
use vigil_server::models::Verdict;
use vigil_server::services::{ClassifierError, MediaStore, ThreatClassifier};
use vigil_server::{build_router, AppState, TokenSettings};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Phrase the stub classifier flags as phishing
pub const PHISHING_PHRASE: &str = "verify your password";
/// Phrase that makes the stub classifier fail like a broken upstream
pub const OUTAGE_PHRASE: &str = "trigger upstream outage";

/// Scripted classifier
///
/// Text containing [`PHISHING_PHRASE`] is a HIGH / 0.9 phishing threat, text
/// containing [`OUTAGE_PHRASE`] is an API error, anything else is clean.
pub struct StubClassifier;

#[async_trait]
impl ThreatClassifier for StubClassifier {
    async fn classify_text(
        &self,
        content: &str,
        _model_hint: Option<&str>,
    ) -> Result<Verdict, ClassifierError> {
        let lowered = content.to_lowercase();
        if lowered.contains(OUTAGE_PHRASE) {
            return Err(ClassifierError::Api(502, "bad gateway".to_string()));
        }
        if lowered.contains(PHISHING_PHRASE) {
            return Ok(Verdict {
                detected: true,
                severity: Severity::High,
                confidence: 0.9,
                kind: "phishing".to_string(),
                description: "Credential harvesting attempt".to_string(),
                indicators: vec![PHISHING_PHRASE.to_string()],
            });
        }
        Ok(Verdict::no_threat("No threat indicators found"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub shutdown: CancellationToken,
    _media: TempDir,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Router over an in-memory database with the stub classifier and two workers
pub async fn create_test_app() -> TestApp {
    let db = vigil_common::db::init_memory_database().await.unwrap();
    let media = TempDir::new().unwrap();
    let shutdown = CancellationToken::new();

    let jobs = JobsConfig {
        workers: 2,
        queue_capacity: 32,
        task_retention: 100,
    };

    let (state, _workers) = AppState::start(
        db,
        Arc::new(StubClassifier),
        MediaStore::new(media.path()),
        &jobs,
        TokenSettings::new(TEST_SECRET.to_string(), &AuthConfig::default()),
        shutdown.clone(),
    );

    TestApp {
        router: build_router(state.clone()),
        state,
        shutdown,
        _media: media,
    }
}

impl TestApp {
    /// Insert a user with [`TEST_PASSWORD`]; returns its id
    pub async fn create_user(&self, username: &str) -> i64 {
        create_user(
            &self.state.db,
            &NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                password_hash: hash_password(TEST_PASSWORD).unwrap(),
            },
        )
        .await
        .unwrap()
    }

    /// Access token for a user, signed with the test secret
    pub fn token_for(&self, user_id: i64) -> String {
        issue_token(
            &TokenClaims::new(user_id, TokenKind::Access, chrono::Duration::minutes(5)),
            TEST_SECRET,
        )
        .unwrap()
    }

    /// Send a request; returns the status and the JSON body (`Null` if empty)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Poll the task registry until the task has finished
    pub async fn wait_for_task(&self, task_id: Uuid, owner_id: i64) -> TaskRecord {
        for _ in 0..300 {
            if let Some(record) = self.state.jobs.tasks().get(task_id, owner_id).await {
                if record.state.is_finished() {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish in time", task_id);
    }
}

/// Parse a `task_id` field from a response body
pub fn task_id(body: &Value) -> Uuid {
    body["task_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("no task_id in {}", body))
}
