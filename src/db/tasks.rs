//! Upload task queue operations

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use super::parse_time;
use crate::error::QueueError;
use crate::types::UploadStatus;

const TASK_COLUMNS: &str = "id, file_id, provider, status, taken, attempts, time";

/// One upload of one file to one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub file_id: String,
    pub provider: String,
    pub status: UploadStatus,
    pub claimed: bool,
    /// Times this task has been claimed
    pub attempts: i64,
    pub updated_at: DateTime<Utc>,
}

/// Task counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub pending: i64,
    pub in_progress: i64,
    pub success: i64,
    pub failed: i64,
    pub claimed: i64,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    file_id: String,
    provider: String,
    status: i64,
    taken: bool,
    attempts: i64,
    time: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, QueueError> {
        let status = UploadStatus::from_code(self.status).ok_or_else(|| {
            QueueError::Corrupt(format!("task {} has status code {}", self.id, self.status))
        })?;

        Ok(Task {
            id: self.id,
            file_id: self.file_id,
            provider: self.provider,
            status,
            claimed: self.taken,
            attempts: self.attempts,
            updated_at: parse_time(&self.time)?,
        })
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    file_id: &str,
    provider: &str,
    now: &str,
) -> Result<Task, QueueError> {
    let row = sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        INSERT INTO queue (file_id, provider, status, taken, attempts, time)
        VALUES (?, ?, ?, 0, 0, ?)
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(file_id)
    .bind(provider)
    .bind(UploadStatus::Pending.code())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    row.into_task()
}

pub async fn get(conn: &mut SqliteConnection, task_id: i64) -> Result<Option<Task>, QueueError> {
    sqlx::query_as::<_, TaskRow>(&format!("SELECT {TASK_COLUMNS} FROM queue WHERE id = ?"))
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(TaskRow::into_task)
        .transpose()
}

pub async fn list_for_file(
    conn: &mut SqliteConnection,
    file_id: &str,
) -> Result<Vec<Task>, QueueError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM queue WHERE file_id = ? ORDER BY id ASC"
    ))
    .bind(file_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(TaskRow::into_task)
    .collect()
}

/// Mark the next eligible task as taken and return it.
///
/// Eligible: not taken and not successful. The least recently updated task
/// goes first, so a task that was just failed and released queues behind
/// everything else. The conditional update keeps the claim exclusive even
/// when several processes share the database file.
pub async fn claim_next(conn: &mut SqliteConnection) -> Result<Option<Task>, QueueError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        UPDATE queue
        SET taken = 1, attempts = attempts + 1
        WHERE id = (
            SELECT id FROM queue
            WHERE taken = 0 AND status != ?
            ORDER BY time ASC, id ASC
            LIMIT 1
        )
        AND taken = 0
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(UploadStatus::Success.code())
    .fetch_optional(&mut *conn)
    .await?
    .map(TaskRow::into_task)
    .transpose()
}

/// Change the status of a claimed task, releasing it when `release` is set.
///
/// Returns `None` when the task does not exist or is not claimed.
pub async fn update_claimed(
    conn: &mut SqliteConnection,
    task_id: i64,
    status: UploadStatus,
    release: bool,
    now: &str,
) -> Result<Option<Task>, QueueError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        UPDATE queue
        SET status = ?, taken = ?, time = ?
        WHERE id = ? AND taken = 1
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(status.code())
    .bind(!release)
    .bind(now)
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(TaskRow::into_task)
    .transpose()
}

/// Put an unclaimed, unfinished task back to pending.
///
/// Returns `None` when the task does not exist, is claimed or has succeeded.
pub async fn reset(
    conn: &mut SqliteConnection,
    task_id: i64,
    now: &str,
) -> Result<Option<Task>, QueueError> {
    sqlx::query_as::<_, TaskRow>(&format!(
        r#"
        UPDATE queue
        SET status = ?, time = ?
        WHERE id = ? AND taken = 0 AND status != ?
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(UploadStatus::Pending.code())
    .bind(now)
    .bind(task_id)
    .bind(UploadStatus::Success.code())
    .fetch_optional(&mut *conn)
    .await?
    .map(TaskRow::into_task)
    .transpose()
}

/// Clear the taken flag. Returns false when the task does not exist.
pub async fn release(conn: &mut SqliteConnection, task_id: i64) -> Result<bool, QueueError> {
    let result = sqlx::query("UPDATE queue SET taken = 0 WHERE id = ?")
        .bind(task_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Clear every taken flag, leaving statuses alone. Returns rows changed.
pub async fn release_all(conn: &mut SqliteConnection) -> Result<u64, QueueError> {
    let result = sqlx::query("UPDATE queue SET taken = 0 WHERE taken = 1")
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn stats(conn: &mut SqliteConnection) -> Result<TaskStats, QueueError> {
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM queue GROUP BY status")
            .fetch_all(&mut *conn)
            .await?;

    let mut stats = TaskStats::default();
    for (code, count) in rows {
        match UploadStatus::from_code(code) {
            Some(UploadStatus::Pending) => stats.pending = count,
            Some(UploadStatus::InProgress) => stats.in_progress = count,
            Some(UploadStatus::Success) => stats.success = count,
            Some(UploadStatus::Failed) => stats.failed = count,
            None => {
                return Err(QueueError::Corrupt(format!("unknown status code {}", code)));
            }
        }
    }

    stats.claimed = sqlx::query_scalar("SELECT COUNT(*) FROM queue WHERE taken = 1")
        .fetch_one(&mut *conn)
        .await?;

    Ok(stats)
}
