use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::database::SqliteStore;
use crate::models::errors::AppError;
use crate::models::pagination::Page;
use crate::models::user::{ImageRef, NewUser, Role, User, UserCredentials};

/// Persistence for user records
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `Conflict` if the email is taken.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Users holding `role`, optionally windowed, with the unwindowed total
    async fn list_by_role(&self, role: Role, page: Option<Page>) -> Result<(Vec<User>, i64), AppError>;
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    phone: String,
    role: String,
    education: String,
    avatar_public_id: Option<String>,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_credentials(self) -> Result<UserCredentials, AppError> {
        let role = self
            .role
            .parse::<Role>()
            .map_err(AppError::storage_failed)?;

        let avatar = match (self.avatar_public_id, self.avatar_url) {
            (Some(public_id), Some(url)) => Some(ImageRef { public_id, url }),
            _ => None,
        };

        Ok(UserCredentials {
            user: User {
                id: self.id,
                name: self.name,
                email: self.email,
                phone: self.phone,
                role,
                education: self.education,
                avatar,
                created_at: self.created_at,
            },
            password_hash: self.password_hash,
        })
    }

    fn into_user(self) -> Result<User, AppError> {
        self.into_credentials().map(|credentials| credentials.user)
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, phone, role, education, \
                            avatar_public_id, avatar_url, created_at";

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let email = normalize_email(&user.email);
        let now = Utc::now();
        let (avatar_public_id, avatar_url) = match &user.avatar {
            Some(avatar) => (Some(avatar.public_id.clone()), Some(avatar.url.clone())),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, phone, role, education,
                               avatar_public_id, avatar_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&user.name)
        .bind(&email)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(&user.education)
        .bind(avatar_public_id)
        .bind(avatar_url)
        .bind(now)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AppError::conflict("User already exist"));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Created user {} with role {}", id, user.role);

        Ok(User {
            id,
            name: user.name,
            email,
            phone: user.phone,
            role: user.role,
            education: user.education,
            avatar: user.avatar,
            created_at: now,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(self.pool())
        .await?;

        row.map(UserRow::into_credentials).transpose()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn list_by_role(&self, role: Role, page: Option<Page>) -> Result<(Vec<User>, i64), AppError> {
        // LIMIT -1 means no limit in SQLite
        let (limit, offset) = page
            .map(|p| (i64::from(p.limit), p.offset()))
            .unwrap_or((-1, 0));

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE role = ? ORDER BY created_at ASC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role.as_str())
            .fetch_one(self.pool())
            .await?;

        let users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((users, total))
    }
}
