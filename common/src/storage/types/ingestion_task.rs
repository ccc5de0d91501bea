use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::ingestion_payload::IngestionPayload;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskErrorInfo {
    pub code: String,
    pub message: String,
}

stored_object!(IngestionTask, "ingestion_tasks", {
    payload: IngestionPayload,
    status: TaskStatus,
    attempts: u32,
    last_error: Option<TaskErrorInfo>
});

pub const MAX_ATTEMPTS: u32 = 3;

impl IngestionTask {
    pub fn new(payload: IngestionPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            payload,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub async fn enqueue(db: &SurrealDbClient, payload: IngestionPayload) -> Result<Self, AppError> {
        let task = Self::new(payload);
        db.store_item(task.clone())
            .await?
            .ok_or_else(|| AppError::InternalStorageError("failed to enqueue ingestion task".into()))
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < MAX_ATTEMPTS
    }

    /// Tasks a worker should pick up: pending, or failed-but-retryable.
    pub async fn queued(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM ingestion_tasks \
                 WHERE status = 'Pending' OR (status = 'Failed' AND attempts < $max_attempts) \
                 ORDER BY created_at ASC",
            )
            .bind(("max_attempts", MAX_ATTEMPTS))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn mark_processing(db: &SurrealDbClient, id: &str) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE type::thing('ingestion_tasks', $id) \
                 SET status = 'Processing', attempts += 1 RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("ingestion task {id} not found")))
    }

    pub async fn mark_succeeded(db: &SurrealDbClient, id: &str) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('ingestion_tasks', $id) SET status = 'Succeeded', last_error = NONE RETURN AFTER")
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("ingestion task {id} not found")))
    }

    pub async fn mark_failed(
        db: &SurrealDbClient,
        id: &str,
        error: TaskErrorInfo,
    ) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('ingestion_tasks', $id) SET status = 'Failed', last_error = $error RETURN AFTER")
            .bind(("id", id.to_string()))
            .bind(("error", error))
            .await?
            .take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("ingestion task {id} not found")))
    }

    pub async fn mark_dead_letter(
        db: &SurrealDbClient,
        id: &str,
        error: TaskErrorInfo,
    ) -> Result<Self, AppError> {
        let updated: Option<Self> = db
            .client
            .query("UPDATE type::thing('ingestion_tasks', $id) SET status = 'DeadLetter', last_error = $error RETURN AFTER")
            .bind(("id", id.to_string()))
            .bind(("error", error))
            .await?
            .take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("ingestion task {id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_transitions_persist() {
        let db = SurrealDbClient::memory("tasks_ns", "tasks_db").await.expect("mem db");
        let task = IngestionTask::enqueue(
            &db,
            IngestionPayload::Ingest { source_path: "/a.txt".into() },
        )
        .await
        .expect("enqueue");

        let processing = IngestionTask::mark_processing(&db, &task.id).await.expect("processing");
        assert_eq!(processing.status, TaskStatus::Processing);
        assert_eq!(processing.attempts, 1);

        let failed = IngestionTask::mark_failed(
            &db,
            &task.id,
            TaskErrorInfo { code: "embedding_service_error".into(), message: "boom".into() },
        )
        .await
        .expect("failed");
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.can_retry());

        let succeeded = IngestionTask::mark_succeeded(&db, &task.id).await.expect("succeeded");
        assert_eq!(succeeded.status, TaskStatus::Succeeded);
        assert!(succeeded.last_error.is_none());
    }

    #[tokio::test]
    async fn queued_excludes_terminal_tasks() {
        let db = SurrealDbClient::memory("tasks_ns2", "tasks_db2").await.expect("mem db");
        let pending = IngestionTask::enqueue(
            &db,
            IngestionPayload::Ingest { source_path: "/a.txt".into() },
        )
        .await
        .expect("enqueue pending");
        let done = IngestionTask::enqueue(
            &db,
            IngestionPayload::Ingest { source_path: "/b.txt".into() },
        )
        .await
        .expect("enqueue done");
        IngestionTask::mark_processing(&db, &done.id).await.expect("processing");
        IngestionTask::mark_succeeded(&db, &done.id).await.expect("succeeded");

        let queued = IngestionTask::queued(&db).await.expect("queued");
        let ids: Vec<_> = queued.iter().map(|t| t.id.clone()).collect();
        assert!(ids.contains(&pending.id));
        assert!(!ids.contains(&done.id));
    }
}
