use axum::{extract::State, http::StatusCode, Json};
use tokio::task;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    events::{self, ChangeEvent},
    jobs::enqueue_job,
    state::AppState,
};

/// Accepts one change notification from the record-writing side and turns
/// it into queued work. The handler itself never touches domain rows; every
/// reaction runs in the worker.
pub async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<ChangeEvent>,
) -> AppResult<StatusCode> {
    let queued = events::jobs_for_event(&event);
    if queued.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let count = queued.len();
    task::spawn_blocking(move || -> AppResult<()> {
        let mut conn = state.db()?;
        for (job_type, payload) in queued {
            enqueue_job(&mut conn, job_type, payload, None).map_err(AppError::internal)?;
        }
        Ok(())
    })
    .await
    .map_err(|err| AppError::internal(format!("enqueue task panicked: {err}")))??;

    info!(jobs = count, "change event accepted");
    Ok(StatusCode::ACCEPTED)
}
