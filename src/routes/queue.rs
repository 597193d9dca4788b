//! Queue inspection

use axum::{extract::State, Json};

use crate::db::TaskStats;
use crate::error::Result;
use crate::state::AppState;

pub async fn stats(State(state): State<AppState>) -> Result<Json<TaskStats>> {
    Ok(Json(state.queue().stats().await?))
}
