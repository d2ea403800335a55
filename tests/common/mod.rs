#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use blog_backend::{
    build_router,
    services::{
        account_service::AccountService, blog_service::BlogService, database::SqliteStore,
        media_host::InMemoryMediaHost, token::TokenIssuer,
    },
    utils::config::AppConfig,
    AppState,
};

pub const BOUNDARY: &str = "----blog-backend-test-boundary";

/// PNG file signature, enough for the type sniffing to accept it
pub const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01];
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
pub const GIF_BYTES: &[u8] = b"GIF89a\x01\x00\x01\x00";

pub const PASSWORD: &str = "correct horse battery";
pub const VALID_TITLE: &str = "A valid title here";

pub fn valid_intro() -> String {
    "x".repeat(100)
}

/// Router plus the in-memory image host it talks to
pub struct TestApp {
    pub router: Router,
    pub media: InMemoryMediaHost,
    _dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Setup a test application backed by a throwaway SQLite file
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(AppConfig::default()).await
}

pub async fn setup_test_app_with(config: AppConfig) -> TestApp {
    let dir = TempDir::new().unwrap();
    let database_url = format!("sqlite://{}", dir.path().join("blog.db").display());

    let config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url,
        database_max_connections: 1,
        jwt_secret: "integration-test-secret".to_string(),
        ..config
    };

    let store = SqliteStore::connect(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to open test database");
    store.migrate().await.expect("Failed to migrate test database");

    let media = InMemoryMediaHost::new();
    let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_expire_days);
    let accounts = AccountService::new(Arc::new(store.clone()), Arc::new(media.clone()), tokens)
        .with_bcrypt_cost(4);
    let blogs = BlogService::new(Arc::new(store.clone()), Arc::new(media.clone()));

    let app_state = AppState {
        config: Arc::new(config),
        store,
        accounts,
        blogs,
    };

    TestApp {
        router: build_router(app_state),
        media,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, headers, body }
    }

    /// Registers a user and returns the session token and the user JSON
    pub async fn register(&self, name: &str, email: &str, role: &str) -> (String, Value) {
        let form = MultipartBuilder::new()
            .text("name", name)
            .text("email", email)
            .text("password", PASSWORD)
            .text("phone", "+15550100")
            .text("role", role)
            .text("education", "BSc Computer Science")
            .file("avatar", "avatar.png", "image/png", PNG_BYTES);

        let response = self
            .send(multipart_request(Method::POST, "/user/register", form, None))
            .await;
        assert_eq!(response.status, StatusCode::OK, "register failed: {}", response.body);

        let token = response.body["token"].as_str().unwrap().to_string();
        (token, response.body["user"].clone())
    }

    pub async fn author(&self) -> String {
        self.register("Ada Author", "ada@example.com", "Author").await.0
    }

    /// Creates a blog with only a main image and returns its JSON
    pub async fn create_blog(&self, token: &str, published: bool) -> Value {
        let form = MultipartBuilder::new()
            .text("title", VALID_TITLE)
            .text("intro", &valid_intro())
            .text("category", "Tech")
            .text("published", if published { "true" } else { "false" })
            .file("mainImage", "valid.jpg", "image/jpeg", JPEG_BYTES);

        let response = self
            .send(multipart_request(Method::POST, "/blog/post", form, Some(token)))
            .await;
        assert_eq!(response.status, StatusCode::OK, "create failed: {}", response.body);
        response.body["blog"].clone()
    }
}

impl TestResponse {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    }
}

/// Hand-built multipart/form-data body
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

fn with_token(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::COOKIE, format!("token={}", token)),
        None => builder,
    }
}

pub fn multipart_request(
    method: Method,
    uri: &str,
    form: MultipartBuilder,
    token: Option<&str>,
) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(form.finish()))
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    with_token(Request::builder().method(method).uri(uri), token)
        .body(Body::empty())
        .unwrap()
}
