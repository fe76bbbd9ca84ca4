use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::api::{BlockUserRequest, UpdateStatusRequest};
use agora_types::models::User;

use crate::AppState;
use crate::error::db_task;
use crate::middleware::AuthUser;

const MAX_STATUS_LEN: usize = 140;

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let rows = db_task(move || db.db.list_users()).await?;

    let users: Vec<User> = rows
        .iter()
        .filter_map(|row| {
            row.to_user()
                .map_err(|e| warn!("Skipping corrupt user '{}': {:#}", row.id, e))
                .ok()
        })
        .collect();

    Ok(Json(users))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let uid = user.id.to_string();
    let row = db_task(move || db.db.get_user_by_id(&uid))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let me = row.to_user().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(me))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let status = req.status.trim().to_string();
    if status.chars().count() > MAX_STATUS_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.clone();
    let uid = user.id.to_string();
    if !db_task(move || db.db.set_user_status(&uid, &status)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Admin only.
pub async fn set_blocked(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(admin): Extension<AuthUser>,
    Json(req): Json<BlockUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let uid = user_id.to_string();
    let is_blocked = req.is_blocked;
    if !db_task(move || db.db.set_user_blocked(&uid, is_blocked)).await? {
        return Err(StatusCode::NOT_FOUND);
    }

    info!(
        "User {} {} by admin {}",
        user_id,
        if is_blocked { "blocked" } else { "unblocked" },
        admin.id
    );
    Ok(StatusCode::NO_CONTENT)
}
