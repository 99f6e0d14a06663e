// ============================
// crates/backend-lib/src/auth/remember.rs
// ============================
/** Remember-me tokens
A token moves between two states. NONE has no stored digest; ACTIVE has the
digest of exactly one outstanding token. Issuing from either state lands in
ACTIVE with a fresh token, revoking lands in NONE, and verification in NONE
always fails.

Both writes go through `UserStore::update_token_digest_only`, so issuing or
revoking a token never runs the password rules. */
use std::sync::Arc;

use tracing::{debug, info};
use zeroize::Zeroizing;

use super::password::Digester;
use super::token_generator::generate_remember_token;
use crate::config::RememberSettings;
use crate::error::AppError;
use crate::metrics;
use crate::storage::UserStore;
use crate::user::User;

/// Whether `candidate` is the token whose digest `user` holds.
///
/// False when no digest is stored, and false when the stored digest is
/// malformed.
pub fn remember_token_authenticated(digester: &Digester, user: &User, candidate: &str) -> bool {
    let Some(digest) = user.remember_token_digest.as_deref().filter(|d| !d.is_empty()) else {
        return false;
    };
    digester.verify(digest, candidate)
}

/// Issues, revokes and verifies remember-tokens
#[derive(Clone)]
pub struct RememberTokenManager<S> {
    store: S,
    digester: Arc<Digester>,
    settings: RememberSettings,
}

impl<S: UserStore> RememberTokenManager<S> {
    pub fn new(store: S, digester: Arc<Digester>, settings: RememberSettings) -> Self {
        Self {
            store,
            digester,
            settings,
        }
    }

    /// Issue a fresh token for `user`, replacing any active one.
    ///
    /// The plaintext is returned and kept in `user.remember_token`; only its
    /// digest reaches the store. `user` is left untouched if the write fails.
    pub async fn remember_me(&self, user: &mut User) -> Result<Zeroizing<String>, AppError> {
        let token = generate_remember_token(&self.settings);
        let digest = self.digester.digest(&token)?;

        self.store
            .update_token_digest_only(user.id, Some(&digest))
            .await?;

        user.remember_token_digest = Some(digest);
        user.remember_token = Some(token.clone());
        ::metrics::counter!(metrics::REMEMBER_TOKEN_ISSUED).increment(1);
        info!(user_id = %user.id, "remember token issued");
        Ok(token)
    }

    /// Revoke the active token, if any
    pub async fn forget_me(&self, user: &mut User) -> Result<(), AppError> {
        self.store.update_token_digest_only(user.id, None).await?;

        user.remember_token_digest = None;
        user.remember_token = None;
        ::metrics::counter!(metrics::REMEMBER_TOKEN_REVOKED).increment(1);
        info!(user_id = %user.id, "remember token revoked");
        Ok(())
    }

    pub fn remember_token_authenticated(&self, user: &User, candidate: &str) -> bool {
        let ok = remember_token_authenticated(&self.digester, user, candidate);
        if ok {
            ::metrics::counter!(metrics::REMEMBER_TOKEN_VERIFIED).increment(1);
        } else {
            ::metrics::counter!(metrics::REMEMBER_TOKEN_REJECTED).increment(1);
            debug!(user_id = %user.id, "remember token rejected");
        }
        ok
    }
}
