use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Reference to an asset held by the remote image host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Author,
    Reader,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "Author",
            Role::Reader => "Reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Author" => Ok(Role::Author),
            "Reader" => Ok(Role::Reader),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// A registered user as exposed to clients. The password hash never leaves the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub education: String,
    pub avatar: Option<ImageRef>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// URL of the avatar, or an empty string when the upload never succeeded
    pub fn avatar_url(&self) -> String {
        self.avatar
            .as_ref()
            .map(|avatar| avatar.url.clone())
            .unwrap_or_default()
    }
}

/// User plus the stored bcrypt hash, only used while checking credentials
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// Data required to insert a user record
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub role: Role,
    pub education: String,
    pub avatar: Option<ImageRef>,
}
