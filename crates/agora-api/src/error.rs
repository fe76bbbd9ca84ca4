use axum::http::StatusCode;
use tracing::{error, warn};

use agora_core::ForumError;

/// HTTP status for a core failure. Backend errors are logged here so
/// handlers can just `?` them.
pub fn forum_status(e: ForumError) -> StatusCode {
    match e {
        ForumError::NotFound(_) => StatusCode::NOT_FOUND,
        ForumError::Conflict(id) => {
            warn!("Gave up on contended content {}", id);
            StatusCode::CONFLICT
        }
        ForumError::InvalidReference(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ForumError::Validation(_) => StatusCode::BAD_REQUEST,
        ForumError::Store(e) => {
            error!("Content store error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run blocking database work off the async runtime.
pub async fn db_task<F, T>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Database error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Run a blocking core operation off the async runtime.
pub async fn forum_task<F, T>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> agora_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(forum_status)
}
