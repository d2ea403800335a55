use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::models::errors::AppError;
use crate::models::user::{Role, User};
use crate::utils::cookies::{get_cookie, TOKEN_COOKIE_NAME};
use crate::AppState;

pub const NOT_AUTHENTICATED_MESSAGE: &str = "User not authenticated!";

/// Roles allowed on the authoring routes
pub const AUTHOR_ONLY: &[Role] = &[Role::Author];

/// The signed-in user, placed in request extensions by [`authenticate`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Session token from the `token` cookie, or an `Authorization: Bearer` header
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, TOKEN_COOKIE_NAME) {
        return Some(token);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves the session token to a user and stores it as [`CurrentUser`]
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(req.headers()).ok_or_else(|| {
        tracing::debug!("Rejected {} {}: no session token", req.method(), req.uri().path());
        AppError::unauthorized(NOT_AUTHENTICATED_MESSAGE)
    })?;

    let user = state.accounts.authenticate(&token).await?;
    tracing::debug!("Authenticated user {} ({})", user.id, user.role);

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Rejects users whose role is not in `allowed`. Must run after [`authenticate`].
pub async fn authorize(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match req.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) => user,
        None => return Err(AppError::unauthorized(NOT_AUTHENTICATED_MESSAGE)),
    };

    if !user.has_role(allowed) {
        tracing::warn!("User {} with role {} denied {}", user.id, user.role, req.uri().path());
        return Err(AppError::forbidden(format!(
            "{} not allowed to access this resource",
            user.role
        )));
    }

    Ok(next.run(req).await)
}
