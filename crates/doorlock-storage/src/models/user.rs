use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a registry user.
///
/// Every kind may open the door with a linked card; the kind only matters to
/// administration front ends (admins manage everyone, controllers manage
/// plain users).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserKind {
    Admin,
    Controller,
    User,
}

impl UserKind {
    /// Whether the user may administer other users.
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserKind::Admin | UserKind::Controller)
    }
}

impl fmt::Display for UserKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            UserKind::Admin => "admin",
            UserKind::Controller => "controller",
            UserKind::User => "user",
        };
        f.write_str(text)
    }
}

/// A person who may hold cards.
///
/// # Database Schema
///
/// Maps to the `users` table; `username` is unique.
///
/// # Examples
///
/// ```
/// use doorlock_storage::models::{User, UserKind};
/// use chrono::Utc;
///
/// let user = User {
///     id: 1,
///     username: "alice".to_string(),
///     kind: UserKind::User,
///     disabled: false,
///     created_at: Utc::now(),
/// };
///
/// assert!(!user.is_disabled());
/// assert!(!user.kind.is_privileged());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Auto-increment primary key
    pub id: i64,

    /// Unique login name
    pub username: String,

    pub kind: UserKind,

    /// Disabled users are denied at the door
    pub disabled: bool,

    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}
