//! Bounded job queue drained by a fixed worker pool
//!
//! At-most-once: a job taken off the queue runs exactly once and is never
//! retried. A full queue is reported to the caller instead of blocking.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::runner::{AnalysisJob, JobRunner, SessionTarget};
use super::tasks::TaskRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is shut down")]
    Closed,
}

/// Handle for submitting jobs
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<AnalysisJob>,
    tasks: TaskRegistry,
    runner: Arc<JobRunner>,
}

impl JobQueue {
    /// Create the queue and spawn `workers` worker tasks
    ///
    /// Workers stop taking jobs once `shutdown` is cancelled; a job already
    /// running is finished first.
    pub fn start(
        runner: Arc<JobRunner>,
        tasks: TaskRegistry,
        workers: usize,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel::<AnalysisJob>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&runner),
                    tasks.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!(workers = workers.max(1), capacity = capacity.max(1), "Job queue started");

        (Self { tx, tasks, runner }, handles)
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    /// Submit a job without waiting for it
    ///
    /// On failure the task record is dropped; a reserved session slot is
    /// settled as failed so the session can still finish.
    pub async fn enqueue(&self, job: AnalysisJob) -> Result<Uuid, EnqueueError> {
        let task_id = job.task_id;
        let owner_id = job.owner_id;
        let target = job.session;

        self.tasks
            .insert_pending(task_id, owner_id, job.payload.modality())
            .await;

        let err = match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(task_id = %task_id, owner_id, "Job enqueued");
                return Ok(task_id);
            }
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueError::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueError::Closed,
        };

        tracing::warn!(task_id = %task_id, owner_id, error = %err, "Job rejected");
        self.tasks.remove(task_id).await;

        if let SessionTarget::Reserved(session_id) = target {
            if let Err(e) = self.runner.settle_slot(session_id, owner_id, true).await {
                tracing::error!(session_id, error = %e, "Failed to release reserved job slot");
            }
        }

        Err(err)
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<AnalysisJob>>>,
    runner: Arc<JobRunner>,
    tasks: TaskRegistry,
    shutdown: CancellationToken,
) {
    tracing::debug!(worker_id, "Job worker started");

    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else {
            break;
        };

        tasks.mark_running(job.task_id).await;
        let outcome = runner.run(&job).await.map_err(|e| e.to_string());
        tasks.finish(job.task_id, outcome).await;
    }

    tracing::debug!(worker_id, "Job worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::runner::AnalysisPayload;
    use crate::jobs::tasks::TaskState;
    use crate::models::Verdict;
    use crate::services::{ClassifierError, MediaStore, ThreatClassifier};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use vigil_common::{NotificationHub, SessionKind, SessionStatus};

    /// Blocks every call until released
    struct GatedClassifier {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ThreatClassifier for GatedClassifier {
        async fn classify_text(
            &self,
            _content: &str,
            _model_hint: Option<&str>,
        ) -> Result<Verdict, ClassifierError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(Verdict::no_threat("clean"))
        }
    }

    struct Fixture {
        queue: JobQueue,
        pool: sqlx::SqlitePool,
        owner: i64,
        started: Arc<Notify>,
        release: Arc<Notify>,
        shutdown: CancellationToken,
        handles: Vec<JoinHandle<()>>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(capacity: usize) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = vigil_common::db::init_memory_database().await.unwrap();
        let owner = crate::db::users::create_user(
            &pool,
            &crate::db::users::NewUser {
                username: "alice".into(),
                password_hash: "x".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runner = Arc::new(JobRunner::new(
            pool.clone(),
            Arc::new(GatedClassifier {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
            }),
            MediaStore::new(dir.path()),
            NotificationHub::default(),
        ));

        let shutdown = CancellationToken::new();
        let (queue, handles) =
            JobQueue::start(runner, TaskRegistry::new(16), 1, capacity, shutdown.clone());

        Fixture {
            queue,
            pool,
            owner,
            started,
            release,
            shutdown,
            handles,
            _dir: dir,
        }
    }

    fn text_job(owner: i64, target: SessionTarget) -> AnalysisJob {
        AnalysisJob::new(
            owner,
            target,
            AnalysisPayload::Text {
                text: "hello".to_string(),
                source_type: None,
            },
        )
    }

    async fn wait_finished(tasks: &TaskRegistry, task_id: Uuid, owner: i64) -> TaskState {
        for _ in 0..200 {
            if let Some(record) = tasks.get(task_id, owner).await {
                if record.state.is_finished() {
                    return record.state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    #[tokio::test]
    async fn test_worker_runs_enqueued_job() {
        let f = fixture(8).await;

        let task_id = f
            .queue
            .enqueue(text_job(f.owner, SessionTarget::Implicit))
            .await
            .unwrap();
        f.started.notified().await;
        assert_eq!(
            f.queue.tasks().get(task_id, f.owner).await.unwrap().state,
            TaskState::Running
        );

        f.release.notify_one();
        let state = wait_finished(f.queue.tasks(), task_id, f.owner).await;
        assert!(matches!(state, TaskState::Succeeded { .. }));

        f.shutdown.cancel();
        for handle in f.handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_and_settles_reserved_slot() {
        let f = fixture(1).await;

        // First job occupies the only worker, second fills the queue
        f.queue
            .enqueue(text_job(f.owner, SessionTarget::Implicit))
            .await
            .unwrap();
        f.started.notified().await;
        f.queue
            .enqueue(text_job(f.owner, SessionTarget::Implicit))
            .await
            .unwrap();

        let session = crate::db::sessions::create_session(
            &f.pool,
            f.owner,
            SessionKind::Multimodal,
            SessionStatus::Processing,
            &serde_json::json!({}),
            2,
        )
        .await
        .unwrap();

        let rejected = f
            .queue
            .enqueue(text_job(f.owner, SessionTarget::Reserved(session.id)))
            .await
            .unwrap_err();
        assert_eq!(rejected, EnqueueError::Full);
        assert_eq!(f.queue.tasks().len().await, 2);

        let session = crate::db::sessions::get_session(&f.pool, session.id, f.owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.jobs_finished, 1);
        assert_eq!(session.jobs_failed, 1);
        assert_eq!(session.status, SessionStatus::Processing);

        f.shutdown.cancel();
        f.release.notify_waiters();
    }
}
