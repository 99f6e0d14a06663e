// ============================
// warden-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod password;
pub mod remember;
pub mod token_generator;
mod service;
mod service_impl;

pub use password::{meets_complexity, Digester};
pub use remember::{remember_token_authenticated, RememberTokenManager};
pub use service::Authenticator;
pub use service_impl::DefaultAuthenticator;
pub use token_generator::{generate_remember_token, generate_secure_token_with_size};
