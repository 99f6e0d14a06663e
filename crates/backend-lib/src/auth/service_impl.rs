use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use warden_common::UserId;

use crate::auth::remember::remember_token_authenticated;
use crate::auth::{Authenticator, Digester};
use crate::error::AppError;
use crate::metrics;
use crate::storage::UserStore;
use crate::user::User;

pub struct DefaultAuthenticator<S> {
    store: S,
    digester: Arc<Digester>,
}

impl<S> DefaultAuthenticator<S> {
    pub fn new(store: S, digester: Arc<Digester>) -> Self {
        Self { store, digester }
    }
}

#[async_trait]
impl<S: UserStore> Authenticator for DefaultAuthenticator<S> {
    async fn authenticate_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AppError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .filter(|user| self.digester.verify(&user.password_digest, password));

        match &user {
            Some(user) => {
                ::metrics::counter!(metrics::AUTH_PASSWORD_SUCCEEDED).increment(1);
                debug!(user_id = %user.id, "password login succeeded");
            }
            None => {
                ::metrics::counter!(metrics::AUTH_PASSWORD_FAILED).increment(1);
                debug!("password login failed");
            }
        }
        Ok(user)
    }

    async fn authenticate_remember_token(
        &self,
        id: UserId,
        token: &str,
    ) -> Result<Option<User>, AppError> {
        let user = self
            .store
            .find_user(id)
            .await?
            .filter(|user| remember_token_authenticated(&self.digester, user, token));

        if user.is_some() {
            ::metrics::counter!(metrics::REMEMBER_TOKEN_VERIFIED).increment(1);
        } else {
            ::metrics::counter!(metrics::REMEMBER_TOKEN_REJECTED).increment(1);
            debug!(user_id = %id, "remember token login failed");
        }
        Ok(user)
    }
}
