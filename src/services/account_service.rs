use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use super::media_host::{destroy_quietly, MediaHost};
use super::token::TokenIssuer;
use super::user_store::UserStore;
use crate::models::errors::AppError;
use crate::models::pagination::Page;
use crate::models::user::{NewUser, Role, User};
use crate::utils::multipart::UploadedFile;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid Email or Password!";

/// Registration data as received from the client
#[derive(Debug, Default)]
pub struct RegisterInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub education: Option<String>,
    pub avatar: Option<UploadedFile>,
}

/// Login form. Accepted as JSON or multipart fields.
#[derive(Debug, Default, Deserialize)]
pub struct LoginInput {
    pub role: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// A user together with a freshly issued session token
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Registration, login and session resolution
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    media: Arc<dyn MediaHost>,
    tokens: TokenIssuer,
    bcrypt_cost: u32,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| {
        Regex::new(r"^\+?[0-9][0-9 \-]{4,19}$").expect("phone pattern is valid")
    })
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, media: Arc<dyn MediaHost>, tokens: TokenIssuer) -> Self {
        Self {
            users,
            media,
            tokens,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Overrides the bcrypt work factor (tests use the minimum)
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Creates an account and signs the new user in.
    ///
    /// An avatar upload failure is logged and the account is stored without an avatar.
    pub async fn register(&self, input: RegisterInput) -> Result<Session, AppError> {
        let avatar = input
            .avatar
            .ok_or_else(|| AppError::validation_failed("User Avatar Required"))?;
        avatar.ensure_image()?;

        let (name, email, password, phone, role, education) = match (
            input.name,
            input.email,
            input.password,
            input.phone,
            input.role,
            input.education,
        ) {
            (Some(n), Some(e), Some(p), Some(ph), Some(r), Some(ed)) => (n, e, p, ph, r, ed),
            _ => return Err(AppError::validation_failed("Please fill full details")),
        };

        if !email_regex().is_match(email.trim()) {
            return Err(AppError::validation_failed("Please provide a valid email"));
        }
        if !phone_regex().is_match(phone.trim()) {
            return Err(AppError::validation_failed("Please provide a valid phone number"));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AppError::validation_failed(format!(
                "Password must contain at least {} characters!",
                MIN_PASSWORD_CHARS
            )));
        }
        let role = role
            .parse::<Role>()
            .map_err(|_| AppError::validation_failed("Role must be Author or Reader"))?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("User already exist"));
        }

        let password_hash = self.hash_password(password).await?;

        let avatar = match self.media.upload(&avatar).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::error!("Avatar upload failed during registration: {}", e);
                None
            }
        };
        let avatar_id = avatar.as_ref().map(|image| image.public_id.clone());

        let created = self
            .users
            .create(NewUser {
                name: name.trim().to_string(),
                email,
                password_hash,
                phone: phone.trim().to_string(),
                role,
                education: education.trim().to_string(),
                avatar,
            })
            .await;

        let user = match created {
            Ok(user) => user,
            Err(e) => {
                // A concurrent registration may have taken the email after the lookup above
                if let Some(public_id) = avatar_id {
                    tracing::warn!("User insert failed, removing uploaded avatar {}", public_id);
                    destroy_quietly(self.media.as_ref(), [public_id]).await;
                }
                return Err(e);
            }
        };

        tracing::info!("User registered: {} ({})", user.id, user.role);

        let token = self.tokens.issue(&user)?;
        Ok(Session { user, token })
    }

    /// Checks credentials and the requested role
    pub async fn login(&self, input: LoginInput) -> Result<Session, AppError> {
        let (role, email, password) = match (input.role, input.email, input.password) {
            (Some(r), Some(e), Some(p)) => (r, e, p),
            _ => return Err(AppError::validation_failed("Please fill full form!")),
        };

        let credentials = self.users.find_by_email(&email).await?.ok_or_else(|| {
            tracing::warn!("Login attempt for unknown email");
            AppError::unauthorized(INVALID_CREDENTIALS_MESSAGE)
        })?;

        if !self.verify_password(password, credentials.password_hash).await? {
            tracing::warn!("Invalid password for user {}", credentials.user.id);
            return Err(AppError::unauthorized(INVALID_CREDENTIALS_MESSAGE));
        }

        if credentials.user.role.as_str() != role.trim() {
            return Err(AppError::unauthorized(format!(
                "User with provided role {} not found!",
                role.trim()
            )));
        }

        let user = credentials.user;
        tracing::info!("User logged in: {}", user.id);

        let token = self.tokens.issue(&user)?;
        Ok(Session { user, token })
    }

    /// Resolves a session token to the user it identifies
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let claims = self.tokens.verify(token)?;
        self.users
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not authenticated!"))
    }

    /// All users with the `Author` role
    pub async fn list_authors(&self, page: Option<Page>) -> Result<(Vec<User>, i64), AppError> {
        self.users.list_by_role(Role::Author, page).await
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AppError::internal_error(format!("Password hashing task failed: {}", e)))?
            .map_err(AppError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AppError::internal_error(format!("Password check task failed: {}", e)))?
            .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::test_store;
    use crate::services::media_host::InMemoryMediaHost;

    fn avatar() -> UploadedFile {
        UploadedFile {
            field: "avatar".to_string(),
            file_name: Some("me.png".to_string()),
            content_type: Some("image/png".to_string()),
            data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
        }
    }

    fn registration(email: &str, role: &str) -> RegisterInput {
        RegisterInput {
            name: Some("Grace".to_string()),
            email: Some(email.to_string()),
            password: Some("correct horse".to_string()),
            phone: Some("+15550100".to_string()),
            role: Some(role.to_string()),
            education: Some("BSc".to_string()),
            avatar: Some(avatar()),
        }
    }

    async fn service() -> (AccountService, InMemoryMediaHost, tempfile::TempDir) {
        let (store, dir) = test_store().await;
        let media = InMemoryMediaHost::new();
        let service = AccountService::new(
            Arc::new(store),
            Arc::new(media.clone()),
            TokenIssuer::new("test-secret", 7),
        )
        .with_bcrypt_cost(4);
        (service, media, dir)
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (service, media, _dir) = service().await;

        let session = service.register(registration("grace@example.com", "Author")).await.unwrap();
        assert!(!session.token.is_empty());
        assert!(session.user.avatar.is_some());
        assert_eq!(media.uploads().len(), 1);

        let login = service
            .login(LoginInput {
                role: Some("Author".to_string()),
                email: Some("grace@example.com".to_string()),
                password: Some("correct horse".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(login.user.id, session.user.id);

        let resolved = service.authenticate(&login.token).await.unwrap();
        assert_eq!(resolved.email, "grace@example.com");
    }

    #[tokio::test]
    async fn test_racing_duplicate_registrations_keep_one_avatar() {
        let (service, media, _dir) = service().await;

        let (first, second) = tokio::join!(
            service.register(registration("twin@example.com", "Reader")),
            service.register(registration("twin@example.com", "Reader")),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::Conflict { .. }))));

        let session = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        let avatar = session.user.avatar.as_ref().unwrap();
        assert!(media.contains(&avatar.public_id));
        assert_eq!(media.stored_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let (service, _media, _dir) = service().await;
        service.register(registration("dup@example.com", "Author")).await.unwrap();

        let mut second = registration("dup@example.com", "Reader");
        second.name = Some("Another Name".to_string());
        let err = service.register(second).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_register_requires_avatar_and_fields() {
        let (service, _media, _dir) = service().await;

        let mut no_avatar = registration("a@example.com", "Author");
        no_avatar.avatar = None;
        let err = service.register(no_avatar).await.unwrap_err();
        assert_eq!(err.to_string(), "User Avatar Required");

        let mut no_phone = registration("a@example.com", "Author");
        no_phone.phone = None;
        let err = service.register(no_phone).await.unwrap_err();
        assert_eq!(err.to_string(), "Please fill full details");

        let mut bad_avatar = registration("a@example.com", "Author");
        bad_avatar.avatar = Some(UploadedFile {
            content_type: Some("image/gif".to_string()),
            ..avatar()
        });
        let err = service.register(bad_avatar).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));

        let err = service.register(registration("not-an-email", "Author")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));

        let err = service.register(registration("b@example.com", "Admin")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_avatar_upload_failure_does_not_abort() {
        let (service, media, _dir) = service().await;
        media.fail_uploads_for_field("avatar");

        let session = service.register(registration("noimg@example.com", "Reader")).await.unwrap();
        assert_eq!(session.user.avatar, None);
    }

    #[tokio::test]
    async fn test_login_failure_messages() {
        let (service, _media, _dir) = service().await;
        service.register(registration("grace@example.com", "Reader")).await.unwrap();

        let login = |role: &str, email: &str, password: &str| LoginInput {
            role: Some(role.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        };

        let err = service.login(login("Reader", "nobody@example.com", "correct horse")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
        assert_eq!(err.to_string(), INVALID_CREDENTIALS_MESSAGE);

        let err = service.login(login("Reader", "grace@example.com", "wrong password")).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_CREDENTIALS_MESSAGE);

        let err = service.login(login("Author", "grace@example.com", "correct horse")).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
        assert_eq!(err.to_string(), "User with provided role Author not found!");

        let err = service.login(LoginInput::default()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_token() {
        let (service, _media, _dir) = service().await;
        let err = service.authenticate("garbage").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }
}
