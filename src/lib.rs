// Library exports for the server binary and the integration tests

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use handlers::{blogs, health, users};
use middleware::auth::{authenticate, authorize, AUTHOR_ONLY};
use services::account_service::AccountService;
use services::blog_service::BlogService;
use services::database::SqliteStore;
use utils::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: SqliteStore,
    pub accounts: AccountService,
    pub blogs: BlogService,
}

/// Builds the full route tree. Middleware layers (trace, timeout, CORS) are
/// added by the binary.
pub fn build_router(state: AppState) -> Router {
    let user_public = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/authors", get(users::all_authors));

    let user_session = Router::new()
        .route("/logout", get(users::logout))
        .route("/myprofile", get(users::my_profile))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let blog_public = Router::new().route("/all", get(blogs::all_blogs));

    let blog_session = Router::new()
        .route("/singleblog/:id", get(blogs::single_blog))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    // The last layer added runs first, so authentication precedes the role check
    let blog_author = Router::new()
        .route("/post", post(blogs::create_blog))
        .route("/delete/:id", delete(blogs::delete_blog))
        .route("/myblogs", get(blogs::my_blogs))
        .route("/updateblog/:id", put(blogs::update_blog))
        .route_layer(from_fn_with_state(AUTHOR_ONLY, authorize))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/user", user_public.merge(user_session))
        .nest("/blog", blog_public.merge(blog_session).merge(blog_author))
        .with_state(state)
}
