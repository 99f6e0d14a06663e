// ============================
// warden-lib/src/lib.rs
// ============================
//! Credential validation and remember-me tokens for user accounts.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod user;
pub mod users;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, DefaultAuthenticator, Digester, RememberTokenManager};
use crate::config::Settings;
use crate::error::AppError;
use crate::storage::{FlatFileStorage, UserStore};
use crate::users::UserService;
use crate::validation::{DnsHostLookup, MailExchangerCheck};

pub use crate::user::{NewUser, User, UserChanges};
pub use warden_common::{UserId, UserView};

/// Application state shared by all callers
#[derive(Clone)]
pub struct AppState<S> {
    /// Settings the state was built from
    pub settings: Arc<Settings>,
    /// Storage backend
    pub storage: S,
    /// Validated create/update
    pub users: UserService<S>,
    /// Remember-token issuance and revocation
    pub remember: RememberTokenManager<S>,
    /// Login paths
    pub auth: Arc<dyn Authenticator>,
}

impl<S: UserStore + Clone + 'static> AppState<S> {
    /// Create a new application state. The mail-exchanger check follows
    /// `settings.email`.
    pub fn new(storage: S, settings: Settings) -> Result<Self, AppError> {
        let mail_check: Option<Arc<dyn MailExchangerCheck>> =
            if settings.email.check_mail_exchanger {
                Some(Arc::new(DnsHostLookup::new(Duration::from_millis(
                    settings.email.lookup_timeout_ms,
                ))))
            } else {
                None
            };
        Self::with_mail_check(storage, settings, mail_check)
    }

    /// Create a new application state with an explicit mail-exchanger check
    pub fn with_mail_check(
        storage: S,
        settings: Settings,
        mail_check: Option<Arc<dyn MailExchangerCheck>>,
    ) -> Result<Self, AppError> {
        settings.validate()?;
        let digester = Arc::new(Digester::new(&settings.hashing)?);

        let users = UserService::new(
            storage.clone(),
            digester.clone(),
            settings.password_policy.clone(),
            mail_check,
        );
        let remember =
            RememberTokenManager::new(storage.clone(), digester.clone(), settings.remember);
        let auth = Arc::new(DefaultAuthenticator::new(storage.clone(), digester));

        Ok(Self {
            settings: Arc::new(settings),
            storage,
            users,
            remember,
            auth,
        })
    }
}

impl AppState<FlatFileStorage> {
    /// State over the flat-file store at `settings.data_dir`
    pub fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let storage = FlatFileStorage::new(&settings.data_dir)?;
        Self::new(storage, settings)
    }
}
