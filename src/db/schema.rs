//! Database schema initialization

use std::collections::HashSet;

use sqlx::SqlitePool;

use super::quote_ident;
use crate::error::QueueError;
use crate::providers::ProviderRegistry;

/// Initialize the database schema.
///
/// `files` gets one nullable access-handle column per registered provider.
/// Columns are only ever added, so registering a new provider later keeps
/// existing rows intact.
pub async fn initialize_schema(
    pool: &SqlitePool,
    registry: &ProviderRegistry,
) -> Result<(), QueueError> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    let existing: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info('files')")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    for name in registry.names() {
        if existing.contains(name) {
            continue;
        }

        sqlx::query(&format!(
            "ALTER TABLE files ADD COLUMN {} TEXT",
            quote_ident(name)
        ))
        .execute(pool)
        .await?;

        tracing::info!(provider = name, "Added access handle column for provider");
    }

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- File ledger. Provider handle columns are added by initialize_schema.
CREATE TABLE IF NOT EXISTS files (
    file_id TEXT PRIMARY KEY,
    storage_request TEXT NOT NULL,
    time TEXT NOT NULL
);

-- Upload tasks, one per (file, provider)
CREATE TABLE IF NOT EXISTS queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id TEXT NOT NULL REFERENCES files(file_id),
    provider TEXT NOT NULL,
    status INTEGER NOT NULL,
    taken INTEGER NOT NULL DEFAULT 0,
    attempts INTEGER NOT NULL DEFAULT 0,
    time TEXT NOT NULL,

    UNIQUE(file_id, provider)
);

CREATE INDEX IF NOT EXISTS idx_queue_claim ON queue(taken, status, time);
CREATE INDEX IF NOT EXISTS idx_queue_file_id ON queue(file_id);
"#;
