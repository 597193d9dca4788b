//! File ledger lookups

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::db::{FileRecord, Task};
use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FileResponse {
    #[serde(flatten)]
    pub record: FileRecord,
    pub tasks: Vec<Task>,
}

/// Get a file's ledger entry and the state of its uploads
pub async fn get_file(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<FileResponse>> {
    let record = state.queue().file(&hash).await?;
    let tasks = state.queue().tasks_for_file(&hash).await?;

    Ok(Json(FileResponse { record, tasks }))
}
