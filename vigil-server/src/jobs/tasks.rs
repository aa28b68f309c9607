//! In-memory task records
//!
//! One record per enqueued job, addressable by task id for polling. The table
//! is bounded: once `capacity` records exist the oldest is evicted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use vigil_common::Modality;

use crate::models::Verdict;

/// Job lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded { verdict: Verdict },
    Failed { error: String },
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Succeeded { .. } | TaskState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    #[serde(skip)]
    pub owner_id: i64,
    #[serde(rename = "type")]
    pub modality: Modality,
    #[serde(flatten)]
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

struct TaskTable {
    records: HashMap<Uuid, TaskRecord>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

/// Shared task record table
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RwLock<TaskTable>>,
}

impl TaskRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TaskTable {
                records: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    /// Register a freshly enqueued task
    pub async fn insert_pending(&self, task_id: Uuid, owner_id: i64, modality: Modality) {
        let mut table = self.inner.write().await;

        while table.order.len() >= table.capacity {
            match table.order.pop_front() {
                Some(evicted) => {
                    table.records.remove(&evicted);
                }
                None => break,
            }
        }

        table.records.insert(
            task_id,
            TaskRecord {
                task_id,
                owner_id,
                modality,
                state: TaskState::Pending,
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );
        table.order.push_back(task_id);
    }

    pub async fn mark_running(&self, task_id: Uuid) {
        let mut table = self.inner.write().await;
        if let Some(record) = table.records.get_mut(&task_id) {
            record.state = TaskState::Running;
        }
    }

    /// Store a job's outcome
    pub async fn finish(&self, task_id: Uuid, outcome: Result<Verdict, String>) {
        let mut table = self.inner.write().await;
        if let Some(record) = table.records.get_mut(&task_id) {
            record.state = match outcome {
                Ok(verdict) => TaskState::Succeeded { verdict },
                Err(error) => TaskState::Failed { error },
            };
            record.finished_at = Some(Utc::now());
        }
    }

    /// Look up a task owned by `owner_id`
    pub async fn get(&self, task_id: Uuid, owner_id: i64) -> Option<TaskRecord> {
        let table = self.inner.read().await;
        table
            .records
            .get(&task_id)
            .filter(|record| record.owner_id == owner_id)
            .cloned()
    }

    /// Drop a record whose job never reached the queue
    pub async fn remove(&self, task_id: Uuid) {
        let mut table = self.inner.write().await;
        if table.records.remove(&task_id).is_some() {
            table.order.retain(|id| *id != task_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lifecycle_and_serialization() {
        let registry = TaskRegistry::new(10);
        let id = Uuid::new_v4();

        registry.insert_pending(id, 1, Modality::Text).await;
        assert_eq!(registry.get(id, 1).await.unwrap().state, TaskState::Pending);

        registry.mark_running(id).await;
        registry
            .finish(id, Ok(Verdict::no_threat("clean")))
            .await;

        let record = registry.get(id, 1).await.unwrap();
        assert!(record.state.is_finished());
        assert!(record.finished_at.is_some());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["state"], "succeeded");
        assert_eq!(value["type"], "text");
        assert_eq!(value["verdict"]["threat_detected"], false);
        assert!(value.get("owner_id").is_none());
    }

    #[tokio::test]
    async fn test_failed_outcome_keeps_error() {
        let registry = TaskRegistry::new(10);
        let id = Uuid::new_v4();
        registry.insert_pending(id, 1, Modality::Audio).await;
        registry.finish(id, Err("Invalid payload: bad".to_string())).await;

        let value = serde_json::to_value(registry.get(id, 1).await.unwrap()).unwrap();
        assert_eq!(value["state"], "failed");
        assert_eq!(value["error"], "Invalid payload: bad");
    }

    #[tokio::test]
    async fn test_other_owner_cannot_see_task() {
        let registry = TaskRegistry::new(10);
        let id = Uuid::new_v4();
        registry.insert_pending(id, 1, Modality::Visual).await;
        assert!(registry.get(id, 2).await.is_none());
    }

    #[tokio::test]
    async fn test_oldest_records_are_evicted() {
        let registry = TaskRegistry::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            registry.insert_pending(*id, 1, Modality::Text).await;
        }

        assert_eq!(registry.len().await, 2);
        assert!(registry.get(ids[0], 1).await.is_none());
        assert!(registry.get(ids[2], 1).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_forgets_task() {
        let registry = TaskRegistry::new(4);
        let id = Uuid::new_v4();
        registry.insert_pending(id, 1, Modality::Text).await;
        registry.remove(id).await;
        assert!(registry.get(id, 1).await.is_none());
        assert_eq!(registry.len().await, 0);
    }
}
