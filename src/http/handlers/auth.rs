use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{clean, normalize_email, required};
use crate::auth::{self, Claims, Role};
use crate::dates;
use crate::error::Error;
use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, Error> {
    let email = normalize_email(required(&body.email, "email")?);
    let password = required(&body.password, "password")?;

    let db = state.db();
    let row: Option<(String, String, String)> = db
        .query_row(
            "SELECT id, password_hash, role FROM users WHERE email = ?",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    drop(db);

    // Unknown email and wrong password answer identically.
    let (user_id, password_hash, role) = match row {
        Some(row) => row,
        None => return Err(Error::Unauthorized("Invalid credentials".to_string())),
    };
    if !auth::verify_password(password, &password_hash) {
        return Err(Error::Unauthorized("Invalid credentials".to_string()));
    }
    let role = Role::parse(&role).unwrap_or(Role::Staff);
    let token = auth::issue_token(
        &state.config.jwt_secret,
        &user_id,
        role,
        &email,
        state.config.token_ttl_hours,
    )?;
    info!("login by {email}");
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "role": role.as_str(),
        "userId": user_id,
    }))
    .into_response())
}

pub async fn verify(Extension(claims): Extension<Claims>) -> Result<Response, Error> {
    Ok(Json(json!({
        "valid": true,
        "user": {
            "userId": claims.sub,
            "role": claims.role.as_str(),
            "email": claims.email,
        },
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateFirstUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

/// Bootstrap account for a fresh install. Only answers while the users table
/// is empty; once any account exists the route is dead and staff management
/// goes through the admin-gated endpoints.
pub async fn create_first_user(
    State(state): State<AppState>,
    Json(body): Json<CreateFirstUserRequest>,
) -> Result<Response, Error> {
    let name = required(&body.name, "name")?;
    let email = normalize_email(required(&body.email, "email")?);
    let password = required(&body.password, "password")?;
    let role = match clean(&body.role) {
        Some(r) => Role::parse(r)
            .ok_or_else(|| Error::validation("role must be 'admin' or 'staff'"))?,
        None => Role::Admin,
    };

    let db = state.db();
    let user_count: i64 = db.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if user_count > 0 {
        return Err(Error::Forbidden("Setup has already been completed".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let now = dates::now_rfc3339();
    db.execute(
        "INSERT INTO users(id, name, email, password_hash, role, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            &email,
            auth::hash_password(password)?,
            role.as_str(),
            &now,
            &now,
        ),
    )?;
    info!("created initial {} account {email}", role.as_str());
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created",
            "user": { "id": id, "email": email, "role": role.as_str() },
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Response, Error> {
    let email = normalize_email(required(&body.email, "email")?);
    let db = state.db();
    let user_id: Option<String> = db
        .query_row("SELECT id FROM users WHERE email = ?", [&email], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(user_id) = user_id {
        let (token, digest) = auth::new_reset_token();
        db.execute(
            "UPDATE users SET reset_token_hash = ?, reset_token_expires_at = ? WHERE id = ?",
            (&digest, auth::reset_token_expiry(), &user_id),
        )?;
        // No mail transport; the operator relays the link from the log.
        info!(
            "password reset link for {email}: {}/reset-password?token={token}&email={email}",
            state.config.frontend_url
        );
    }
    // Same answer either way so the endpoint can't be used to probe emails.
    Ok(
        Json(json!({ "message": "If that email exists, a reset link has been sent" }))
            .into_response(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    pub new_password: Option<String>,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Response, Error> {
    let email = normalize_email(required(&body.email, "email")?);
    let token = required(&body.token, "token")?;
    let new_password = required(&body.new_password, "newPassword")?;

    let db = state.db();
    let row: Option<(String, Option<String>, Option<String>)> = db
        .query_row(
            "SELECT id, reset_token_hash, reset_token_expires_at FROM users WHERE email = ?",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (user_id, digest, expires_at) = match row {
        Some((id, Some(digest), Some(expires_at))) => (id, digest, expires_at),
        _ => return Err(Error::validation("Invalid or expired reset token")),
    };
    if auth::hash_reset_token(token) != digest || !auth::reset_token_still_valid(&expires_at) {
        return Err(Error::validation("Invalid or expired reset token"));
    }

    let hash = auth::hash_password(new_password)?;
    db.execute(
        "UPDATE users SET password_hash = ?, reset_token_hash = NULL,
                          reset_token_expires_at = NULL, updated_at = ?
         WHERE id = ?",
        (&hash, dates::now_rfc3339(), &user_id),
    )?;
    info!("password reset completed for {email}");
    Ok(Json(json!({ "message": "Password has been reset" })).into_response())
}
