use async_trait::async_trait;
use warden_common::UserId;

use crate::error::AppError;
use crate::user::User;

/// Re-establishes who a caller is. `Ok(None)` means "not authenticated" and
/// deliberately does not say why.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AppError>;

    async fn authenticate_remember_token(
        &self,
        id: UserId,
        token: &str,
    ) -> Result<Option<User>, AppError>;
}
