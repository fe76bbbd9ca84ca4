use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use agora_types::models::Role;

use crate::AppState;
use crate::error::db_task;

const MAX_NAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !email.contains('@') || email.len() > MAX_EMAIL_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if email is taken
    let db = state.clone();
    let lookup = email.clone();
    if db_task(move || db.db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let role = match &state.admin_email {
        Some(admin) if normalize_email(admin) == email => Role::Admin,
        _ => Role::User,
    };
    let user_id = Uuid::new_v4();

    let db = state.clone();
    let (uid, uname, uemail) = (user_id.to_string(), name.clone(), email.clone());
    db_task(move || db.db.create_user(&uid, &uname, &uemail, &password_hash, role.as_str()))
        .await
        // Lost a race with a concurrent registration for the same email
        .map_err(|_| StatusCode::CONFLICT)?;

    info!("Registered {} as {} ({})", email, role.as_str(), user_id);

    let token = create_token(&state, user_id, &name, role)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            role,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.clone();
    let email = normalize_email(&req.email);
    let row = db_task(move || db.db.get_user_by_email(&email))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for {}", row.id);
            StatusCode::UNAUTHORIZED
        })?;

    let user = row.to_user().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if user.is_blocked {
        warn!("Blocked user {} tried to log in", user.id);
        return Err(StatusCode::FORBIDDEN);
    }

    let token = create_token(&state, user.id, &user.name, user.role)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(AuthResponse {
        user_id: user.id,
        role: user.role,
        token,
    }))
}

fn create_token(state: &AppState, user_id: Uuid, name: &str, role: Role) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        role,
        exp: (chrono::Utc::now() + state.token_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
