use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use agora_core::ForumError;
use agora_db::{ContentQuery, ContentStore};
use agora_types::api::{ChannelQuery, CreateChannelRequest};
use agora_types::models::Channel;

use crate::AppState;
use crate::error::{db_task, forum_task};
use crate::middleware::AuthUser;

const MAX_CHANNEL_NAME_LEN: usize = 64;

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_CHANNEL_NAME_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let lookup = name.clone();
    if db_task(move || db.db.get_channel_by_name(&lookup)).await?.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    let channel_id = Uuid::new_v4();
    let db = state.clone();
    let (cid, cname, owner) = (channel_id.to_string(), name.clone(), user.id.to_string());
    let row = db_task(move || {
        db.db.create_channel(&cid, &cname, &owner)?;
        db.db.get_channel(&cid)
    })
    .await
    .map_err(|_| StatusCode::CONFLICT)?
    .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    let channel = row.to_channel().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    info!("Channel '{}' ({}) created by {}", channel.name, channel.id, user.id);

    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn list_channels(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let rows = db_task(move || db.db.list_channels(query.q.as_deref())).await?;

    let channels: Vec<Channel> = rows
        .iter()
        .filter_map(|row| {
            row.to_channel()
                .map_err(|e| warn!("Skipping corrupt channel '{}': {:#}", row.id, e))
                .ok()
        })
        .collect();

    Ok(Json(channels))
}

/// Admin only. Removes the channel and every message posted in it; their
/// replies are left behind as hidden orphans.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let removed = forum_task(move || {
        // Drop the channel row first so a concurrent post sees it gone and
        // withdraws its message.
        if !db.db.delete_channel(&channel_id.to_string()).map_err(ForumError::Store)? {
            return Err(ForumError::NotFound(channel_id));
        }

        let messages = db.db.query(&ContentQuery::messages().in_channel(channel_id))?;
        let mut removed = 0usize;
        for message in &messages {
            match agora_core::delete_content(&db.db, message.id) {
                Ok(()) => removed += 1,
                // Already gone; another moderator got there first.
                Err(ForumError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(removed)
    })
    .await?;

    info!(
        "Channel {} deleted by admin {} ({} messages removed)",
        channel_id, user.id, removed
    );
    Ok(StatusCode::NO_CONTENT)
}
