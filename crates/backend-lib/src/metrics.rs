// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_VALIDATION_FAILED: &str = "user.validation_failed";
pub const REMEMBER_TOKEN_ISSUED: &str = "remember_token.issued";
pub const REMEMBER_TOKEN_REVOKED: &str = "remember_token.revoked";
pub const REMEMBER_TOKEN_VERIFIED: &str = "remember_token.verified";
pub const REMEMBER_TOKEN_REJECTED: &str = "remember_token.rejected";
pub const AUTH_PASSWORD_SUCCEEDED: &str = "auth.password.succeeded";
pub const AUTH_PASSWORD_FAILED: &str = "auth.password.failed";
