use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- JWT Claims --

/// Bearer token claims. `role` is informational; authorization decisions
/// re-read the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub token: String,
}

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockUserRequest {
    pub is_blocked: bool,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelQuery {
    pub q: Option<String>,
}

// -- Messages & replies --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub channel_id: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub message_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostReplyRequest {
    pub parent_id: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostReplyResponse {
    pub reply_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub channel_id: Option<Uuid>,
}

// -- Images --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadImageResponse {
    pub image_path: String,
    pub size: u64,
}
