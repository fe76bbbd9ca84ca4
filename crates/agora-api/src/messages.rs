use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use agora_core::{ForumError, NewMessage, NewReply};
use agora_types::api::{
    MessageQuery, PostMessageRequest, PostMessageResponse, PostReplyRequest, PostReplyResponse,
};

use crate::AppState;
use crate::error::forum_task;
use crate::images;
use crate::middleware::AuthUser;

/// Reject image references that do not point at an uploaded image.
async fn check_image(state: &AppState, image_path: Option<&str>) -> Result<(), StatusCode> {
    match image_path {
        Some(path) if !images::is_stored(&state.upload_dir, path).await => {
            Err(StatusCode::BAD_REQUEST)
        }
        _ => Ok(()),
    }
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    check_image(&state, req.image_path.as_deref()).await?;

    let db = state.clone();
    let new = NewMessage {
        channel_id: req.channel_id,
        author_id: user.id,
        text: req.text,
        image_path: req.image_path,
    };
    let message_id = forum_task(move || {
        agora_core::post_message_in_channel(&db.db, new, |channel_id| {
            db.db
                .get_channel(&channel_id.to_string())
                .map(|channel| channel.is_some())
                .map_err(ForumError::Store)
        })
    })
    .await?;

    Ok((StatusCode::CREATED, Json(PostMessageResponse { message_id })))
}

pub async fn post_reply(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<PostReplyRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    check_image(&state, req.image_path.as_deref()).await?;

    let db = state.clone();
    let new = NewReply {
        parent_id: req.parent_id,
        author_id: user.id,
        text: req.text,
        image_path: req.image_path,
    };
    let reply_id = forum_task(move || agora_core::post_reply(&db.db, new)).await?;

    Ok((StatusCode::CREATED, Json(PostReplyResponse { reply_id })))
}

/// Every message, or those of one channel, each with its full reply tree.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let trees =
        forum_task(move || agora_core::list_messages_with_trees(&db.db, query.channel_id)).await?;

    Ok(Json(trees))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let tree = forum_task(move || agora_core::message_with_tree(&db.db, message_id)).await?;

    Ok(Json(tree))
}

/// One reply and everything still attached beneath it.
pub async fn get_reply(
    State(state): State<AppState>,
    Path(reply_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let tree = forum_task(move || agora_core::reply_with_tree(&db.db, reply_id)).await?;

    Ok(Json(tree))
}

/// Admin only. Deletes one message or reply; anything under it disappears
/// from the threads with it.
pub async fn delete_content(
    State(state): State<AppState>,
    Path(content_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    forum_task(move || agora_core::delete_content(&db.db, content_id)).await?;

    info!("Content {} deleted by admin {}", content_id, user.id);
    Ok(StatusCode::NO_CONTENT)
}
