// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
//! Secure token generation for remember-me logins.
//! Tokens are opaque bearer credentials. Only their digest is ever stored.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

use crate::config::RememberSettings;

/** Generate a remember-token with the configured entropy
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_remember_token(settings: &RememberSettings) -> Zeroizing<String> {
    generate_secure_token_with_size(settings.token_bytes)
}

/** Generate a cryptographically secure random token with specified size
# Arguments
* `bytes` - The size of the random token in bytes */
pub fn generate_secure_token_with_size(bytes: usize) -> Zeroizing<String> {
    let mut buffer = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buffer);
    let token = URL_SAFE_NO_PAD.encode(&buffer);
    buffer.zeroize();
    Zeroizing::new(token)
}
