// ============================
// warden-lib/src/users.rs
// ============================
//! Validated create and update of user records.
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use warden_common::UserId;

use crate::auth::Digester;
use crate::config::PasswordPolicy;
use crate::error::AppError;
use crate::metrics;
use crate::storage::UserStore;
use crate::user::{NewUser, User, UserChanges};
use crate::validation::{
    self, is_valid_email_syntax, normalize_email, resolve_deliverability, Candidate,
    Deliverability, Field, MailExchangerCheck, SaveKind, ValidationContext, ValidationErrors,
    MSG_BLANK, USER_RULES,
};

/// The validated save path.
///
/// Every create and update runs [`USER_RULES`] before anything is written;
/// a failing rule blocks the whole save. Nothing here writes the
/// remember-token digest.
#[derive(Clone)]
pub struct UserService<S> {
    store: S,
    digester: Arc<Digester>,
    policy: PasswordPolicy,
    mail_check: Option<Arc<dyn MailExchangerCheck>>,
}

impl<S: UserStore> UserService<S> {
    pub fn new(
        store: S,
        digester: Arc<Digester>,
        policy: PasswordPolicy,
        mail_check: Option<Arc<dyn MailExchangerCheck>>,
    ) -> Self {
        Self {
            store,
            digester,
            policy,
            mail_check,
        }
    }

    pub async fn find(&self, id: UserId) -> Result<User, AppError> {
        self.store.find_user(id).await?.ok_or(AppError::UserNotFound)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.store.find_by_email(email).await
    }

    /// Validate and insert a new account
    pub async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let email = normalize_email(&new_user.email);
        let candidate = Candidate {
            kind: SaveKind::Create,
            email: &email,
            password: new_user.password.as_deref().map(String::as_str),
            password_confirmation: new_user.password_confirmation.as_deref().map(String::as_str),
            old_password: None,
            stored_password_digest: None,
        };

        let email_taken = self.store.email_taken(&email, None).await?;
        let deliverability = self.deliverability(&email).await;
        self.check(&candidate, email_taken, deliverability)?;

        let Some(password) = candidate.new_password() else {
            let mut errors = ValidationErrors::default();
            errors.add(Field::Password, MSG_BLANK);
            return Err(AppError::Validation(errors));
        };

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: email.clone(),
            password_digest: self.digester.digest(password)?,
            remember_token_digest: None,
            created_at: now,
            updated_at: now,
            remember_token: None,
        };
        self.store.insert_user(&user).await?;

        ::metrics::counter!(metrics::USER_CREATED).increment(1);
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Validate and apply changes to an existing account.
    ///
    /// The old-password claim is checked against the digest stored before
    /// this update. On failure nothing is written.
    pub async fn update(&self, id: UserId, changes: UserChanges) -> Result<User, AppError> {
        let mut user = self.find(id).await?;

        let email = changes
            .email
            .as_deref()
            .map(normalize_email)
            .unwrap_or_else(|| user.email.clone());
        let email_changed = email != user.email;

        let candidate = Candidate {
            kind: SaveKind::Update,
            email: &email,
            password: changes.password.as_deref().map(String::as_str),
            password_confirmation: changes.password_confirmation.as_deref().map(String::as_str),
            old_password: changes.old_password.as_deref().map(String::as_str),
            stored_password_digest: Some(&user.password_digest),
        };

        let email_taken = self.store.email_taken(&email, Some(id)).await?;
        let deliverability = if email_changed {
            self.deliverability(&email).await
        } else {
            Deliverability::Unknown
        };
        self.check(&candidate, email_taken, deliverability)?;

        let new_digest = candidate
            .new_password()
            .map(|password| self.digester.digest(password))
            .transpose()?;
        let password_changed = new_digest.is_some();

        if let Some(digest) = new_digest {
            user.password_digest = digest;
        }
        user.email = email;
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;

        ::metrics::counter!(metrics::USER_UPDATED).increment(1);
        info!(user_id = %user.id, email_changed, password_changed, "user updated");
        Ok(user)
    }

    fn check(
        &self,
        candidate: &Candidate<'_>,
        email_taken: bool,
        deliverability: Deliverability,
    ) -> Result<(), AppError> {
        let context = ValidationContext {
            policy: &self.policy,
            digester: &self.digester,
            email_taken,
            deliverability,
        };

        let errors = validation::run(USER_RULES, candidate, &context);
        if !errors.is_empty() {
            ::metrics::counter!(metrics::USER_VALIDATION_FAILED).increment(1);
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(?fields, "save blocked by validation");
        }
        errors.into_result().map_err(AppError::Validation)
    }

    async fn deliverability(&self, email: &str) -> Deliverability {
        match &self.mail_check {
            Some(check) if is_valid_email_syntax(email) => {
                resolve_deliverability(check.as_ref(), email).await
            }
            _ => Deliverability::Unknown,
        }
    }
}
