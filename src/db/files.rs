//! File ledger operations

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection};

use super::{parse_time, quote_ident};
use crate::error::QueueError;
use crate::types::StorageRequest;

/// Ledger entry for one submitted file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub file_id: String,
    pub request: StorageRequest,
    /// Access handle per provider, `None` until that provider's task succeeds
    pub handles: BTreeMap<String, Option<String>>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn handle(&self, provider: &str) -> Option<&str> {
        self.handles.get(provider).and_then(|h| h.as_deref())
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    file_id: &str,
    request: &StorageRequest,
    now: &str,
) -> Result<(), QueueError> {
    let request_json = serde_json::to_string(request)?;

    sqlx::query("INSERT INTO files (file_id, storage_request, time) VALUES (?, ?, ?)")
        .bind(file_id)
        .bind(&request_json)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                QueueError::DuplicateFile(file_id.to_string())
            }
            e => e.into(),
        })?;

    Ok(())
}

/// The storage request submitted with a file
pub async fn storage_request(
    conn: &mut SqliteConnection,
    file_id: &str,
) -> Result<StorageRequest, QueueError> {
    let json: Option<String> =
        sqlx::query_scalar("SELECT storage_request FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_optional(&mut *conn)
            .await?;

    let json = json.ok_or_else(|| QueueError::NotFound(format!("file {}", file_id)))?;
    Ok(serde_json::from_str(&json)?)
}

/// Load a file record with the handle columns for `providers`
pub async fn get(
    conn: &mut SqliteConnection,
    file_id: &str,
    providers: &[&str],
) -> Result<Option<FileRecord>, QueueError> {
    let mut sql = String::from("SELECT file_id, storage_request, time");
    for provider in providers {
        sql.push_str(", ");
        sql.push_str(&quote_ident(provider));
    }
    sql.push_str(" FROM files WHERE file_id = ?");

    let Some(row) = sqlx::query(&sql)
        .bind(file_id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let request_json: String = row.try_get("storage_request")?;
    let time: String = row.try_get("time")?;

    let mut handles = BTreeMap::new();
    for provider in providers {
        let handle: Option<String> = row.try_get(*provider)?;
        handles.insert(provider.to_string(), handle);
    }

    Ok(Some(FileRecord {
        file_id: row.try_get("file_id")?,
        request: serde_json::from_str(&request_json)?,
        handles,
        updated_at: parse_time(&time)?,
    }))
}

/// Write the access handle for one provider column
pub async fn set_handle(
    conn: &mut SqliteConnection,
    file_id: &str,
    column: &str,
    handle: &str,
    now: &str,
) -> Result<(), QueueError> {
    let sql = format!(
        "UPDATE files SET {} = ?, time = ? WHERE file_id = ?",
        quote_ident(column)
    );

    let result = sqlx::query(&sql)
        .bind(handle)
        .bind(now)
        .bind(file_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(QueueError::NotFound(format!("file {}", file_id)));
    }

    Ok(())
}
