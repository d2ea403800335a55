use std::env;

const DEV_JWT_SECRET: &str = "dev-only-secret-change-me";

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expire_days: i64,
    pub cookie_expire_days: i64,
    pub cloudinary: CloudinaryConfig,
    pub max_file_size: usize,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
}

/// Credentials for the remote image host
#[derive(Clone, Default)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

// Keep the API secret out of logs
impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_expire_days", &self.jwt_expire_days)
            .field("cookie_expire_days", &self.cookie_expire_days)
            .field("cloudinary", &self.cloudinary)
            .field("max_file_size", &self.max_file_size)
            .field("cors_origins", &self.cors_origins)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            database_url: "sqlite://blog.db?mode=rwc".to_string(),
            database_max_connections: 5,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_expire_days: 7,
            cookie_expire_days: 7,
            cloudinary: CloudinaryConfig::default(),
            max_file_size: 10 * 1024 * 1024, // 10MB
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                config.port = port_num;
            }
        }

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(max) = env::var("DATABASE_MAX_CONNECTIONS") {
            if let Ok(max_num) = max.parse::<u32>() {
                config.database_max_connections = max_num.max(1);
            }
        }

        match env::var("JWT_SECRET_KEY") {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!("JWT_SECRET_KEY not set, using development secret"),
        }

        if let Ok(days) = env::var("JWT_EXPIRES") {
            if let Ok(days_num) = days.trim_end_matches('d').parse::<i64>() {
                config.jwt_expire_days = days_num;
            }
        }

        if let Ok(days) = env::var("COOKIE_EXPIRE") {
            if let Ok(days_num) = days.parse::<i64>() {
                config.cookie_expire_days = days_num;
            }
        }

        if let Ok(name) = env::var("CLOUDINARY_CLIENT_NAME") {
            config.cloudinary.cloud_name = name;
        }

        if let Ok(key) = env::var("CLOUDINARY_CLIENT_API") {
            config.cloudinary.api_key = key;
        }

        if let Ok(secret) = env::var("CLOUDINARY_CLIENT_SECRET") {
            config.cloudinary.api_secret = secret;
        }

        if let Ok(max_size) = env::var("MAX_FILE_SIZE") {
            if let Ok(size) = max_size.parse::<usize>() {
                config.max_file_size = size;
            }
        }

        if let Ok(origins) = env::var("FRONTEND_URL") {
            config.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(timeout) = env::var("REQUEST_TIMEOUT_SECONDS") {
            if let Ok(timeout_num) = timeout.parse::<u64>() {
                config.request_timeout_seconds = timeout_num;
            }
        }

        config
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
