use axum::http::{header, HeaderValue, Method};
use blog_backend::{
    build_router,
    services::{
        account_service::AccountService,
        blog_service::BlogService,
        database::SqliteStore,
        media_host::{CloudinaryHost, InMemoryMediaHost, MediaHost},
        token::TokenIssuer,
    },
    utils::config::AppConfig,
    AppState,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting blog backend");

    // Load configuration
    let config = AppConfig::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    let store = SqliteStore::connect(&config.database_url, config.database_max_connections).await?;
    store.migrate().await?;

    let media: Arc<dyn MediaHost> = if CloudinaryHost::is_configured(&config.cloudinary) {
        tracing::info!("Using Cloudinary image host ({})", config.cloudinary.cloud_name);
        Arc::new(CloudinaryHost::new(config.cloudinary.clone(), "blog"))
    } else {
        tracing::warn!("Cloudinary credentials missing, images are kept in memory only");
        Arc::new(InMemoryMediaHost::new())
    };

    let tokens = TokenIssuer::new(&config.jwt_secret, config.jwt_expire_days);
    let accounts = AccountService::new(Arc::new(store.clone()), Arc::clone(&media), tokens);
    let blogs = BlogService::new(Arc::new(store.clone()), media);

    // Create shared state
    let app_state = AppState {
        config: Arc::new(config.clone()),
        store: store.clone(),
        accounts,
        blogs,
    };

    let app = build_router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_seconds)))
            .layer(cors_layer(&config.cors_origins)),
    );

    // Parse the bind address
    let addr: SocketAddr = config.bind_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wildcard origins cannot carry cookies, so credentials are only enabled for
/// an explicit origin list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS];

    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(allowed)
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
