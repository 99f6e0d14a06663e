//! The persisted user record and the inputs of a validated save.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_common::{UserId, UserView};
use zeroize::Zeroizing;

/// A persisted user.
///
/// `remember_token` is transient: it holds the plaintext of a token issued
/// during this process's handling of the record and is never serialized.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember_token_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub remember_token: Option<Zeroizing<String>>,
}

impl User {
    /// Whether a remember-token is currently active
    pub fn remembered(&self) -> bool {
        self.remember_token_digest
            .as_deref()
            .is_some_and(|d| !d.is_empty())
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            email: self.email.clone(),
            remembered: self.remembered(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Digests and tokens stay out of logs
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("remembered", &self.remembered())
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Input of account creation
#[derive(Default)]
pub struct NewUser {
    pub email: String,
    pub password: Option<Zeroizing<String>>,
    pub password_confirmation: Option<Zeroizing<String>>,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Some(Zeroizing::new(password.into())),
            password_confirmation: None,
        }
    }

    pub fn with_confirmation(mut self, confirmation: impl Into<String>) -> Self {
        self.password_confirmation = Some(Zeroizing::new(confirmation.into()));
        self
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Changes to an existing account. `None` leaves a field as it is; a blank
/// password also means "keep the current one".
#[derive(Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub password_confirmation: Option<Zeroizing<String>>,
    /// Current password, required when `password` is set
    pub old_password: Option<Zeroizing<String>>,
}

impl UserChanges {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn password(old_password: Option<&str>, password: impl Into<String>) -> Self {
        Self {
            password: Some(Zeroizing::new(password.into())),
            old_password: old_password.map(|p| Zeroizing::new(p.to_string())),
            ..Self::default()
        }
    }

    pub fn with_confirmation(mut self, confirmation: impl Into<String>) -> Self {
        self.password_confirmation = Some(Zeroizing::new(confirmation.into()));
        self
    }
}

impl fmt::Debug for UserChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserChanges")
            .field("email", &self.email)
            .field("changes_password", &self.password.is_some())
            .finish_non_exhaustive()
    }
}
