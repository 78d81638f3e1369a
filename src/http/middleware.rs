use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::router::AppState;
use crate::auth::{self, Claims, Role};
use crate::error::Error;

const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/api/auth/login",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
    "/api/setup/create-user",
];

/// Validates the bearer token and stashes the decoded claims in request
/// extensions for handlers to pick up.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Unauthorized("Missing authorization token".to_string()))?;

    let claims = auth::verify_token(&state.config.jwt_secret, token).map_err(|e| {
        debug!("rejected token on {}", request.uri().path());
        e
    })?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

pub fn require_admin(claims: &Claims) -> Result<(), Error> {
    if claims.role != Role::Admin {
        return Err(Error::Forbidden("Admin access required".to_string()));
    }
    Ok(())
}
