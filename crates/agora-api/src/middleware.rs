use axum::{
    Extension,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;
use uuid::Uuid;

use agora_types::models::Role;

use crate::AppState;
use crate::auth::decode_token;
use crate::error::db_task;

/// The caller, as currently stored (not as of token issue).
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

/// Validate the bearer token and load the user it names.
/// Blocked accounts are turned away even with a valid token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode_token(&state.jwt_secret, bearer.token()).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let db = state.clone();
    let uid = claims.sub.to_string();
    let row = db_task(move || db.db.get_user_by_id(&uid))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let user = row.to_user().map_err(|e| {
        warn!("Unreadable user row {}: {:#}", row.id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if user.is_blocked {
        return Err(StatusCode::FORBIDDEN);
    }

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        name: user.name,
        role: user.role,
    });
    Ok(next.run(req).await)
}

/// Layered inside `require_auth`; only lets admins through.
pub async fn require_admin(
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if user.role != Role::Admin {
        warn!("Non-admin {} ({}) hit an admin route", user.name, user.id);
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}
