//! Queue store
//!
//! The only writer of the file ledger and the task queue. Each operation
//! takes the store lock and runs in a single SQLite transaction; dropping a
//! transaction on any error path rolls it back, so a failed operation leaves
//! nothing behind.
//!
//! Every write transaction opens with a write statement. SQLite then takes
//! the write lock before reading anything, waiting out other processes under
//! the busy timeout rather than failing a read-to-write upgrade.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::{self, files, tasks, FileRecord, Task, TaskStats};
use crate::error::QueueError;
use crate::providers::ProviderRegistry;
use crate::types::{StorageRequest, UploadStatus};

/// A task handed to a worker, with the request of the file it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct ClaimedTask {
    pub task: Task,
    pub request: StorageRequest,
}

/// Durable upload queue shared by the HTTP layer and the workers
#[derive(Clone)]
pub struct QueueStore {
    inner: Arc<QueueStoreInner>,
}

struct QueueStoreInner {
    pool: SqlitePool,
    registry: Arc<ProviderRegistry>,
    /// Serializes operations within this process
    lock: Mutex<()>,
}

impl QueueStore {
    /// Prepare the schema, run startup recovery and return a store ready to
    /// serve claims
    pub async fn open(pool: SqlitePool, registry: Arc<ProviderRegistry>) -> Result<Self, QueueError> {
        db::initialize_schema(&pool, &registry).await?;

        let store = Self {
            inner: Arc::new(QueueStoreInner {
                pool,
                registry,
                lock: Mutex::new(()),
            }),
        };

        let released = store.recover().await?;
        if released > 0 {
            tracing::warn!(released, "Released tasks left claimed by a previous run");
        }

        Ok(store)
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// Record a file and schedule one pending task per provider.
    ///
    /// Either the file and all of its tasks are written, or nothing is.
    /// Repeated provider names collapse into one task.
    pub async fn enqueue(
        &self,
        file_id: &str,
        request: &StorageRequest,
        providers: &[String],
    ) -> Result<Vec<Task>, QueueError> {
        let mut names: Vec<&str> = Vec::with_capacity(providers.len());
        for name in providers {
            if !self.inner.registry.contains(name) {
                return Err(QueueError::UnknownProvider(name.clone()));
            }
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }

        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        // Fails with DuplicateFile on a known hash
        let now = db::now();
        files::insert(&mut tx, file_id, request, &now).await?;

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            created.push(tasks::insert(&mut tx, file_id, name, &now).await?);
        }

        tx.commit().await?;

        tracing::info!(
            file_id = %file_id,
            tasks = created.len(),
            "Enqueued file for upload"
        );

        Ok(created)
    }

    /// Claim the next eligible task.
    ///
    /// Returns [`QueueError::Empty`] when nothing is eligible. The status is
    /// left as-is; the caller marks it in progress before starting work.
    pub async fn claim_next(&self) -> Result<ClaimedTask, QueueError> {
        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        let task = tasks::claim_next(&mut tx).await?.ok_or(QueueError::Empty)?;
        let request = files::storage_request(&mut tx, &task.file_id).await?;

        tx.commit().await?;

        tracing::debug!(
            task_id = task.id,
            file_id = %task.file_id,
            provider = %task.provider,
            attempts = task.attempts,
            "Claimed task"
        );

        Ok(ClaimedTask { task, request })
    }

    /// Change the status of a claimed task without releasing it.
    ///
    /// `Success` is only reachable through [`QueueStore::complete`].
    pub async fn set_status(&self, task_id: i64, status: UploadStatus) -> Result<(), QueueError> {
        if status == UploadStatus::Success {
            return Err(QueueError::InvalidTransition {
                task_id,
                reason: "success must be recorded with complete".to_string(),
            });
        }

        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        let Some(task) = tasks::update_claimed(&mut tx, task_id, status, false, &db::now()).await?
        else {
            return Err(rejection(&mut tx, task_id).await);
        };

        tx.commit().await?;

        tracing::debug!(task_id, provider = %task.provider, status = %status, "Task status changed");
        Ok(())
    }

    /// Mark a claimed task successful and record its access handle.
    ///
    /// The status change, the release and the ledger write commit together.
    pub async fn complete(&self, task_id: i64, handle: &str) -> Result<(), QueueError> {
        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        let now = db::now();
        let Some(task) =
            tasks::update_claimed(&mut tx, task_id, UploadStatus::Success, true, &now).await?
        else {
            return Err(rejection(&mut tx, task_id).await);
        };

        let column = self
            .inner
            .registry
            .column(&task.provider)
            .ok_or_else(|| QueueError::UnknownProvider(task.provider.clone()))?;
        files::set_handle(&mut tx, &task.file_id, column, handle, &now).await?;

        tx.commit().await?;

        tracing::info!(
            task_id,
            file_id = %task.file_id,
            provider = %task.provider,
            handle = %handle,
            "Upload complete"
        );
        Ok(())
    }

    /// Give up a claim without changing the task's status
    pub async fn release(&self, task_id: i64) -> Result<(), QueueError> {
        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        if !tasks::release(&mut tx, task_id).await? {
            return Err(QueueError::NotFound(format!("task {}", task_id)));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Put an unclaimed task back to pending so it is retried from scratch.
    ///
    /// A claimed task belongs to its worker, which must release it first.
    pub async fn reset(&self, task_id: i64) -> Result<(), QueueError> {
        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        let Some(task) = tasks::reset(&mut tx, task_id, &db::now()).await? else {
            return Err(rejection(&mut tx, task_id).await);
        };

        tx.commit().await?;

        tracing::info!(task_id, provider = %task.provider, "Task reset to pending");
        Ok(())
    }

    /// Release every claim. Run before any worker starts; safe to repeat.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let _guard = self.inner.lock.lock().await;
        let mut tx = self.inner.pool.begin().await?;

        let released = tasks::release_all(&mut tx).await?;
        tx.commit().await?;

        Ok(released)
    }

    /// Ledger entry for a file, with a slot for every registered provider
    pub async fn file(&self, file_id: &str) -> Result<FileRecord, QueueError> {
        let providers: Vec<&str> = self.inner.registry.names().collect();
        let mut conn = self.inner.pool.acquire().await?;

        files::get(&mut conn, file_id, &providers)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("file {}", file_id)))
    }

    pub async fn tasks_for_file(&self, file_id: &str) -> Result<Vec<Task>, QueueError> {
        let mut conn = self.inner.pool.acquire().await?;
        tasks::list_for_file(&mut conn, file_id).await
    }

    pub async fn task(&self, task_id: i64) -> Result<Task, QueueError> {
        let mut conn = self.inner.pool.acquire().await?;
        tasks::get(&mut conn, task_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(format!("task {}", task_id)))
    }

    pub async fn stats(&self) -> Result<TaskStats, QueueError> {
        let mut conn = self.inner.pool.acquire().await?;
        tasks::stats(&mut conn).await
    }
}

/// Explain why a conditional task update matched no row
async fn rejection(conn: &mut sqlx::SqliteConnection, task_id: i64) -> QueueError {
    let task = match tasks::get(conn, task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => return QueueError::NotFound(format!("task {}", task_id)),
        Err(e) => return e,
    };

    let reason = if task.claimed {
        "task is claimed".to_string()
    } else if task.status.is_terminal() {
        format!("task is already {}", task.status)
    } else {
        "task is not claimed".to_string()
    };

    QueueError::InvalidTransition { task_id, reason }
}
