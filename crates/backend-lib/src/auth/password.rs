// ============================
// warden-lib/src/auth/password.rs
// ============================
//! Salted digests and password complexity.
use scrypt::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Scrypt,
};

use crate::config::{HashingSettings, PasswordPolicy};
use crate::error::AppError;

/// Produces and checks scrypt digests at an explicit cost.
///
/// The cost is fixed at construction; verification reads the cost that was
/// encoded into each digest, so digests made at another cost still verify.
#[derive(Debug, Clone)]
pub struct Digester {
    params: Params,
}

impl Digester {
    pub fn new(settings: &HashingSettings) -> Result<Self, AppError> {
        Ok(Self {
            params: settings.params()?,
        })
    }

    /// Hash `plain` with a fresh salt into a PHC string
    pub fn digest(&self, plain: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Scrypt
            .hash_password_customized(plain.as_bytes(), None, None, self.params.clone(), &salt)
            .map_err(|e| AppError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Check `plain` against `digest`; a digest that does not parse never matches
    pub fn verify(&self, digest: &str, plain: &str) -> bool {
        let parsed_hash = match PasswordHash::new(digest) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Scrypt.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
    }
}

/// At least one ASCII uppercase, lowercase, digit and special character
pub fn meets_complexity(password: &str, policy: &PasswordPolicy) -> bool {
    password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| policy.is_special(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digester() -> Digester {
        Digester::new(&HashingSettings::minimum()).unwrap()
    }

    #[test]
    fn test_digest_and_verify() {
        let digester = digester();
        let digest = digester.digest("SecureP@ssw0rd").unwrap();

        assert_ne!(digest, "SecureP@ssw0rd");
        assert!(digest.starts_with("$scrypt$"));
        assert!(digester.verify(&digest, "SecureP@ssw0rd"));
        assert!(!digester.verify(&digest, "SecureP@ssw0rD"));
        assert!(!digester.verify(&digest, ""));
    }

    #[test]
    fn test_digests_are_salted() {
        let digester = digester();
        let first = digester.digest("SecureP@ssw0rd").unwrap();
        let second = digester.digest("SecureP@ssw0rd").unwrap();
        assert_ne!(first, second);
        assert!(digester.verify(&second, "SecureP@ssw0rd"));
    }

    #[test]
    fn test_cost_is_encoded_in_digest() {
        let digest = digester().digest("SecureP@ssw0rd").unwrap();
        assert!(digest.contains("ln=4"));

        let stronger = Digester::new(&HashingSettings {
            log_n: 6,
            ..HashingSettings::minimum()
        })
        .unwrap();
        // Verification follows the digest's own parameters
        assert!(stronger.verify(&digest, "SecureP@ssw0rd"));
    }

    #[test]
    fn test_malformed_digest_never_matches() {
        let digester = digester();
        assert!(!digester.verify("", "anything"));
        assert!(!digester.verify("plaintext-not-a-hash", "plaintext-not-a-hash"));
        assert!(!digester.verify("$scrypt$ln=4,r=8,p=1$broken", "anything"));
    }

    #[test]
    fn test_complexity_follows_policy_special_set() {
        let policy = PasswordPolicy::default();
        assert!(meets_complexity("SecureP@ssw0rd", &policy));
        assert!(!meets_complexity("securep@ssw0rd", &policy));
        assert!(!meets_complexity("SECUREP@SSW0RD", &policy));
        assert!(!meets_complexity("SecureP@ssword", &policy));
        assert!(!meets_complexity("SecurePassw0rd", &policy));

        let custom = PasswordPolicy {
            special_characters: "_".to_string(),
            ..PasswordPolicy::default()
        };
        assert!(meets_complexity("Secure_Passw0rd", &custom));
        assert!(!meets_complexity("SecureP@ssw0rd", &custom));
    }
}
