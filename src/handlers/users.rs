use axum::{
    extract::{rejection::QueryRejection, Query, Request, State},
    http::header,
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::{json, Value};

use super::{json_body, page_query};
use crate::middleware::auth::CurrentUser;
use crate::models::errors::AppError;
use crate::models::pagination::{PageInfo, PageQuery};
use crate::services::account_service::{LoginInput, RegisterInput, Session};
use crate::utils::cookies::{cleared_cookie, session_cookie};
use crate::utils::multipart::{is_multipart, MultipartForm};
use crate::AppState;

fn session_response(
    state: &AppState,
    session: Session,
    message: &str,
) -> Result<impl IntoResponse, AppError> {
    let cookie = session_cookie(&session.token, state.config.cookie_expire_days)?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "success": true,
            "message": message,
            "token": session.token,
            "user": session.user
        })),
    ))
}

/// POST /user/register (multipart with an `avatar` file)
pub async fn register(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    if !is_multipart(&request) {
        return Err(AppError::validation_failed("User Avatar Required"));
    }

    let mut form = MultipartForm::from_request(request, state.config.max_file_size).await?;
    let input = RegisterInput {
        name: form.text("name"),
        email: form.text("email"),
        password: form.raw("password").filter(|p| !p.is_empty()),
        phone: form.text("phone"),
        role: form.text("role"),
        education: form.text("education"),
        avatar: form.take_file("avatar"),
    };

    let session = state.accounts.register(input).await?;
    session_response(&state, session, "User Registered Successfully")
}

/// POST /user/login (JSON or multipart)
pub async fn login(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, AppError> {
    let input = if is_multipart(&request) {
        let form = MultipartForm::from_request(request, state.config.max_file_size).await?;
        LoginInput {
            role: form.text("role"),
            email: form.text("email"),
            password: form.raw("password").filter(|p| !p.is_empty()),
        }
    } else {
        json_body::<LoginInput>(request, state.config.max_file_size).await?
    };

    let session = state.accounts.login(input).await?;
    session_response(&state, session, "User Loggedin Successfully")
}

/// GET /user/logout
pub async fn logout(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("User logged out: {}", user.id);

    Ok((
        [(header::SET_COOKIE, cleared_cookie()?)],
        Json(json!({
            "success": true,
            "message": "User logged out!"
        })),
    ))
}

/// GET /user/myprofile
pub async fn my_profile(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<Value> {
    Json(json!({
        "success": true,
        "user": user
    }))
}

/// GET /user/authors
pub async fn all_authors(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let page = page_query(query)?;
    let (authors, total) = state.accounts.list_authors(page).await?;

    let mut body = json!({
        "success": true,
        "authors": authors
    });
    if let Some(page) = page {
        body["pagination"] = json!(PageInfo::new(page, total));
    }

    Ok(Json(body))
}
