//! services/api/src/web/auth.rs
//!
//! Account endpoints: registration, login, logout and profile management.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use reflects_core::domain::{AuthUser, Role};
use reflects_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::session_token;
use crate::web::rest::{failure, HandlerError, MessageResponse};
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Either `student` or `teacher`.
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub user_id: i64,
    pub role: String,
    pub access_token: String,
    pub token_type: String,
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

//=========================================================================================
// Validation
//=========================================================================================

fn bad_request(message: &str) -> HandlerError {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn validate_name(name: &str) -> Result<String, HandlerError> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > 50 {
        return Err(bad_request("Name must be between 1 and 50 characters"));
    }
    Ok(name.to_string())
}

fn validate_password(password: &str) -> Result<(), HandlerError> {
    let len = password.chars().count();
    if !(6..=100).contains(&len) {
        return Err(bad_request("Password must be between 6 and 100 characters"));
    }
    Ok(())
}

fn normalize_email(email: &str) -> Result<String, HandlerError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(bad_request("Invalid email address"));
    }
    Ok(email)
}

fn hash_password(password: &str) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })
}

fn session_cookie(session_id: &str, max_age_secs: i64) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id, max_age_secs
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /create-user - Register a student or teacher account
#[utoipa::path(
    post,
    path = "/create-user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created successfully", body = MessageResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;
    let role = req
        .role
        .parse::<Role>()
        .map_err(|_| bad_request("Role must be 'student' or 'teacher'"))?;

    let password_hash = hash_password(&req.password)?;

    let user = state
        .db
        .create_user(&name, &email, &password_hash, role)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => (StatusCode::CONFLICT, "Email already registered".to_string()),
            other => failure("Failed to create user", other),
        })?;

    info!(user_id = user.id, role = %user.role, "User created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

/// POST /login - Exchange credentials for an auth session
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string());
    let email = req.email.trim().to_lowercase();

    // 1. Get user by email
    let user_creds = state.db.get_user_by_email(&email).await.map_err(|e| match e {
        PortError::NotFound(_) => invalid(),
        other => failure("Failed to get user", other),
    })?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(invalid());
    }

    // 3. Create the auth session
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .db
        .create_auth_session(&auth_session_id, user_creds.id, expires_at)
        .await
        .map_err(|e| failure("Failed to create session", e))?;

    // 4. Return the token both as a cookie and in the body
    let cookie = session_cookie(&auth_session_id, Duration::days(SESSION_DAYS).num_seconds());
    let response = LoginResponse {
        user_id: user_creds.id,
        role: user_creds.role.to_string(),
        access_token: auth_session_id,
        token_type: "bearer".to_string(),
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /logout - Invalidate the current auth session
#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let auth_session_id = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| failure("Failed to logout", e))?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", 0))],
        Json(MessageResponse::new("Logged out")),
    ))
}

/// GET /me - Profile of the caller
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "User not found")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MeResponse>, HandlerError> {
    let user = state.db.get_user_by_id(auth.user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
        other => failure("Failed to load user", other),
    })?;

    Ok(Json(MeResponse {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role: user.role.to_string(),
    }))
}

/// PATCH /update-user - Change the caller's name and/or password
#[utoipa::path(
    patch,
    path = "/update-user",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated successfully", body = MessageResponse),
        (status = 400, description = "Nothing to update or invalid value")
    )
)]
pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    let name = req.name.as_deref().filter(|n| !n.is_empty());
    let password = req.password.as_deref().filter(|p| !p.is_empty());
    if name.is_none() && password.is_none() {
        return Err(bad_request("Nothing to update."));
    }

    let name = name.map(validate_name).transpose()?;
    let password_hash = match password {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    state
        .db
        .update_user(auth.user_id, name.as_deref(), password_hash.as_deref())
        .await
        .map_err(|e| failure("Failed to update user", e))?;

    Ok(Json(MessageResponse::new("User updated successfully")))
}
