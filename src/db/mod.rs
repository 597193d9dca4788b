//! Database module for SQLite persistence
//!
//! Holds the file ledger (`files`) and the upload task queue (`queue`).
//! Functions in [`files`] and [`tasks`] run on a caller-supplied connection so
//! the queue store can compose them inside one transaction.

pub mod files;
mod schema;
pub mod tasks;

pub use files::FileRecord;
pub use schema::*;
pub use tasks::{Task, TaskStats};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::error::QueueError;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, QueueError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Current time in the fixed-width form stored in `time` columns.
///
/// Fixed width keeps lexical order equal to chronological order.
pub(crate) fn now() -> String {
    format_time(Utc::now())
}

pub(crate) fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(value: &str) -> Result<DateTime<Utc>, QueueError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::Corrupt(format!("bad timestamp {:?}: {}", value, e)))
}

/// Quote a column identifier. Callers pass registry-validated names only.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_format_sorts_chronologically() {
        let early = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = early + chrono::Duration::microseconds(1);

        assert!(format_time(early) < format_time(later));
        assert_eq!(format_time(early).len(), format_time(later).len());
        assert_eq!(parse_time(&format_time(later)).unwrap(), later);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("ipfs"), "\"ipfs\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
