//! Storage request submission

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db::Task;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::types::StorageRequest;

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub hash: String,
    pub providers: Vec<String>,
    pub tasks: Vec<Task>,
}

/// Record a file and queue one upload per requested provider
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<StorageRequest>,
) -> Result<(StatusCode, Json<StoreResponse>)> {
    if request.hash.trim().is_empty() {
        return Err(AppError::BadRequest("hash is required".to_string()));
    }
    if request.file_pointer.trim().is_empty() {
        return Err(AppError::BadRequest("file_pointer is required".to_string()));
    }

    let providers = request.provider_names();
    if providers.is_empty() {
        return Err(AppError::BadRequest(
            "at least one provider is required".to_string(),
        ));
    }

    let tasks = state
        .queue()
        .enqueue(&request.hash, &request, &providers)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StoreResponse {
            hash: request.hash,
            providers,
            tasks,
        }),
    ))
}
