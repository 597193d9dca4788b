//! Upload workers
//!
//! Each worker repeatedly claims a task, streams the file to the task's
//! provider and reports the outcome back to the queue store. Provider calls
//! happen outside the store lock; the claim is what keeps other workers away.

mod source;

pub use source::{FileSource, LocalFileSource, SourceError};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::QueueError;
use crate::queue::{ClaimedTask, QueueStore};
use crate::types::UploadStatus;

/// What happened to a claimed task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { task_id: i64, handle: String },
    Failed { task_id: i64, reason: String },
}

/// A single upload worker
pub struct Worker {
    id: usize,
    queue: QueueStore,
    source: Arc<dyn FileSource>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: QueueStore,
        source: Arc<dyn FileSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            source,
            poll_interval,
        }
    }

    /// Work until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker = self.id, "Worker started");

        while !*shutdown.borrow() {
            let idle = match self.run_once().await {
                Ok(Some(TaskOutcome::Completed { .. })) => false,
                Ok(Some(TaskOutcome::Failed { .. })) | Ok(None) => true,
                Err(e) => {
                    tracing::error!(worker = self.id, "Queue error: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        tracing::info!(worker = self.id, "Worker stopped");
    }

    /// Claim and process one task. `Ok(None)` means the queue was empty.
    ///
    /// A queue error after the claim gives the claim back before returning,
    /// so the task is retried instead of waiting for a restart.
    pub async fn run_once(&self) -> Result<Option<TaskOutcome>, QueueError> {
        let claimed = match self.queue.claim_next().await {
            Ok(claimed) => claimed,
            Err(QueueError::Empty) => return Ok(None),
            Err(e) => return Err(e),
        };

        match self.process(&claimed).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                let task_id = claimed.task.id;
                if let Err(release_err) = self.queue.release(task_id).await {
                    tracing::warn!(
                        worker = self.id,
                        task_id,
                        "Failed to release claim after queue error: {}",
                        release_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn process(&self, claimed: &ClaimedTask) -> Result<TaskOutcome, QueueError> {
        let task_id = claimed.task.id;
        self.queue.set_status(task_id, UploadStatus::InProgress).await?;

        match self.upload(claimed).await {
            Ok(handle) => {
                self.queue.complete(task_id, &handle).await?;
                Ok(TaskOutcome::Completed { task_id, handle })
            }
            Err(reason) => {
                tracing::warn!(
                    worker = self.id,
                    task_id,
                    file_id = %claimed.task.file_id,
                    provider = %claimed.task.provider,
                    attempts = claimed.task.attempts,
                    "Upload failed: {}",
                    reason
                );
                self.queue.set_status(task_id, UploadStatus::Failed).await?;
                self.queue.release(task_id).await?;
                Ok(TaskOutcome::Failed { task_id, reason })
            }
        }
    }

    async fn upload(&self, claimed: &ClaimedTask) -> Result<String, String> {
        let provider_name = &claimed.task.provider;
        let provider = self
            .queue
            .registry()
            .get(provider_name)
            .ok_or_else(|| format!("provider {} is not registered", provider_name))?;

        let reader = self
            .source
            .open(&claimed.request.file_pointer)
            .await
            .map_err(|e| e.to_string())?;

        let options = claimed.request.options_for(provider_name);

        tracing::debug!(
            worker = self.id,
            task_id = claimed.task.id,
            provider = %provider_name,
            file_pointer = %claimed.request.file_pointer,
            "Uploading"
        );

        provider
            .upload(reader, &options)
            .await
            .map_err(|e| e.to_string())
    }
}

/// A set of workers sharing one shutdown signal
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    /// Spawn `count` workers on the current runtime
    pub fn spawn(
        count: usize,
        queue: QueueStore,
        source: Arc<dyn FileSource>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, receiver) = watch::channel(false);

        let handles = (0..count)
            .map(|id| {
                let worker = Worker::new(id, queue.clone(), Arc::clone(&source), poll_interval);
                tokio::spawn(worker.run(receiver.clone()))
            })
            .collect();

        tracing::info!("Started {} upload workers", count);

        Self { handles, shutdown }
    }

    /// Signal every worker and wait for in-flight uploads to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Worker task panicked: {}", e);
            }
        }
    }
}
