use axum::{
    extract::{rejection::QueryRejection, Path, Query, Request, State},
    response::Json,
    Extension,
};
use serde_json::{json, Value};

use super::{json_body, page_query};
use crate::middleware::auth::CurrentUser;
use crate::models::blog::{BlogFields, ImageSlot};
use crate::models::errors::AppError;
use crate::models::pagination::{PageInfo, PageQuery};
use crate::services::blog_service::BlogImages;
use crate::utils::multipart::{is_multipart, MultipartForm};
use crate::AppState;

/// Splits a multipart blog form into text fields and image files.
///
/// Title, intro and category are trimmed and a blank value counts as absent.
/// Section fields are kept as sent so an update can clear them with a blank value.
fn blog_form(mut form: MultipartForm) -> Result<(BlogFields, BlogImages), AppError> {
    let published = form
        .text("published")
        .map(|value| BlogFields::parse_published(&value))
        .transpose()
        .map_err(AppError::validation_failed)?;

    let fields = BlogFields {
        title: form.text("title"),
        intro: form.text("intro"),
        category: form.text("category"),
        para_one_title: form.raw("paraOneTitle"),
        para_one_description: form.raw("paraOneDescription"),
        para_two_title: form.raw("paraTwoTitle"),
        para_two_description: form.raw("paraTwoDescription"),
        para_three_title: form.raw("paraThreeTitle"),
        para_three_description: form.raw("paraThreeDescription"),
        published,
    };

    let mut images = BlogImages::new();
    for slot in ImageSlot::ALL {
        if let Some(file) = form.take_file(slot.field_name()) {
            images.insert(slot, file);
        }
    }

    if form.has_files() {
        let ignored: Vec<&str> = form.files.keys().map(String::as_str).collect();
        tracing::debug!("Ignoring unexpected file fields: {:?}", ignored);
    }

    Ok((fields, images))
}

/// POST /blog/post
pub async fn create_blog(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    if !is_multipart(&request) {
        return Err(AppError::validation_failed("Blog Main Image Is Mandatory!"));
    }

    let form = MultipartForm::from_request(request, state.config.max_file_size).await?;
    let (fields, images) = blog_form(form)?;
    let blog = state.blogs.create(&user, fields, images).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Blog Uploaded!",
        "blog": blog
    })))
}

/// DELETE /blog/delete/:id
pub async fn delete_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.blogs.delete(&id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Blog Deleted!"
    })))
}

/// GET /blog/all (published blogs only)
pub async fn all_blogs(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let page = page_query(query)?;
    let (blogs, total) = state.blogs.list_published(page).await?;

    let mut body = json!({
        "success": true,
        "allBlogs": blogs
    });
    if let Some(page) = page {
        body["pagination"] = json!(PageInfo::new(page, total));
    }

    Ok(Json(body))
}

/// GET /blog/singleblog/:id
pub async fn single_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let blog = state.blogs.get(&id).await?;

    Ok(Json(json!({
        "success": true,
        "blog": blog
    })))
}

/// GET /blog/myblogs
pub async fn my_blogs(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    let blogs = state.blogs.list_by_author(&user.id).await?;

    Ok(Json(json!({
        "success": true,
        "blogs": blogs
    })))
}

/// PUT /blog/updateblog/:id (JSON, or multipart when images change)
pub async fn update_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let (fields, images) = if is_multipart(&request) {
        let form = MultipartForm::from_request(request, state.config.max_file_size).await?;
        blog_form(form)?
    } else {
        (
            json_body::<BlogFields>(request, state.config.max_file_size).await?,
            BlogImages::new(),
        )
    };

    let blog = state.blogs.update(&id, fields, images).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Blog Updated!",
        "blog": blog
    })))
}
