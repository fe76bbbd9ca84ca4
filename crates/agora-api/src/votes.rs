use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use agora_types::models::VoteAction;

use crate::AppState;
use crate::error::forum_task;
use crate::middleware::AuthUser;

pub async fn like(
    State(state): State<AppState>,
    Path(content_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    cast_vote(state, content_id, user.id, VoteAction::Like).await
}

pub async fn dislike(
    State(state): State<AppState>,
    Path(content_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    cast_vote(state, content_id, user.id, VoteAction::Dislike).await
}

/// Works the same for messages and replies.
async fn cast_vote(
    state: AppState,
    content_id: Uuid,
    user_id: Uuid,
    action: VoteAction,
) -> Result<impl IntoResponse, StatusCode> {
    let attempts = state.vote_attempts;
    let counts = forum_task(move || {
        agora_core::apply_vote_with_attempts(&state.db, content_id, user_id, action, attempts)
    })
    .await?;

    Ok(Json(counts))
}
