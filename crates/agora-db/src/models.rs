//! Database row types. These map directly to SQLite rows.
//! Converted into agora-types models at the edge so the handlers never see
//! raw TEXT ids or timestamps.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use agora_types::models::{Channel, Role, User};

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub status: String,
    pub is_blocked: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.parse::<Role>()?,
            status: self.status.clone(),
            is_blocked: self.is_blocked,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}

impl ChannelRow {
    pub fn to_channel(&self) -> Result<Channel> {
        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name.clone(),
            created_by: parse_id(&self.created_by)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}
