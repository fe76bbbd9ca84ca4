pub mod auth;
pub mod channels;
pub mod error;
pub mod images;
pub mod messages;
pub mod middleware;
pub mod users;
pub mod votes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use agora_db::Database;

use crate::middleware::{require_admin, require_auth};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub upload_dir: PathBuf,
    /// Registrations with this email are given the admin role.
    pub admin_email: Option<String>,
    pub vote_attempts: usize,
}

/// The full HTTP surface, ready to serve.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health));

    let admin_routes = Router::new()
        .route("/channels/{channel_id}", delete(channels::delete_channel))
        .route("/content/{content_id}", delete(messages::delete_content))
        .route("/users/{user_id}/block", put(users::set_blocked))
        .route_layer(from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/messages", get(messages::list_messages).post(messages::post_message))
        .route("/messages/{message_id}", get(messages::get_message))
        .route("/replies", post(messages::post_reply))
        .route("/replies/{reply_id}", get(messages::get_reply))
        .route("/content/{content_id}/like", post(votes::like))
        .route("/content/{content_id}/dislike", post(votes::dislike))
        .route("/users", get(users::list_users))
        .route("/users/me", get(users::me))
        .route("/users/me/status", put(users::update_status))
        .route(
            "/images",
            post(images::upload_image).layer(DefaultBodyLimit::max(images::MAX_IMAGE_SIZE)),
        )
        .route("/images/{name}", get(images::get_image))
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
