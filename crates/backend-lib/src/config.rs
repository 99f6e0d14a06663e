// ============================
// warden-lib/src/config.rs
// ============================
//! Configuration management.
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "Warden.toml";

/// Prefix of environment overrides, e.g. `WARDEN_HASHING__LOG_N=4`
pub const ENV_PREFIX: &str = "WARDEN_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Smallest token size accepted for remember-tokens (128 bits)
pub const MIN_REMEMBER_TOKEN_BYTES: usize = 16;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the flat-file user store
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Work factor of the digest routine
    pub hashing: HashingSettings,
    /// Password length and complexity rules
    pub password_policy: PasswordPolicy,
    /// Remember-token issuance
    pub remember: RememberSettings,
    /// Email deliverability heuristic
    pub email: EmailSettings,
}

/// scrypt work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingSettings {
    /// log2 of the CPU/memory cost
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

/// Password length bounds and the special character set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub special_characters: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RememberSettings {
    /// Bytes of entropy per token
    pub token_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Resolve the email domain before accepting an address
    pub check_mail_exchanger: bool,
    /// Lookups slower than this count as unavailable
    pub lookup_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            hashing: HashingSettings::default(),
            password_policy: PasswordPolicy::default(),
            remember: RememberSettings::default(),
            email: EmailSettings::default(),
        }
    }
}

impl Default for HashingSettings {
    fn default() -> Self {
        Self {
            log_n: scrypt::Params::RECOMMENDED_LOG_N,
            r: scrypt::Params::RECOMMENDED_R,
            p: scrypt::Params::RECOMMENDED_P,
        }
    }
}

impl HashingSettings {
    /// Cheapest cost scrypt accepts here; keeps test suites fast.
    pub const fn minimum() -> Self {
        Self { log_n: 4, r: 8, p: 1 }
    }

    pub(crate) fn params(&self) -> Result<scrypt::Params, AppError> {
        scrypt::Params::new(self.log_n, self.r, self.p, scrypt::Params::RECOMMENDED_LEN)
            .map_err(|e| AppError::Config(format!("invalid scrypt parameters: {e}")))
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 50,
            special_characters: "#?!@$%^&*-".to_string(),
        }
    }
}

impl PasswordPolicy {
    pub fn is_special(&self, c: char) -> bool {
        self.special_characters.contains(c)
    }
}

impl Default for RememberSettings {
    fn default() -> Self {
        Self { token_bytes: 32 }
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            check_mail_exchanger: true,
            lookup_timeout_ms: 2_000,
        }
    }
}

impl Settings {
    /// Load from defaults, `Warden.toml` and `WARDEN_*` environment variables
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load with an explicit config file path. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let settings: Settings = Self::figment(path.as_ref())
            .extract()
            .map_err(|e| AppError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Settings suitable for tests: minimum hash cost, no DNS lookups
    pub fn for_tests<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            hashing: HashingSettings::minimum(),
            email: EmailSettings {
                check_mail_exchanger: false,
                ..EmailSettings::default()
            },
            ..Self::default()
        }
    }

    /// Reject settings the rest of the crate cannot honour
    pub fn validate(&self) -> Result<(), AppError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "unknown log level `{}`",
                self.log_level
            )));
        }

        let policy = &self.password_policy;
        if policy.min_length < 8 {
            return Err(AppError::Config(
                "password_policy.min_length must be at least 8".to_string(),
            ));
        }
        if policy.max_length < policy.min_length {
            return Err(AppError::Config(
                "password_policy.max_length must not be below min_length".to_string(),
            ));
        }
        if policy.special_characters.is_empty() {
            return Err(AppError::Config(
                "password_policy.special_characters must not be empty".to_string(),
            ));
        }

        if self.remember.token_bytes < MIN_REMEMBER_TOKEN_BYTES {
            return Err(AppError::Config(format!(
                "remember.token_bytes must be at least {MIN_REMEMBER_TOKEN_BYTES}"
            )));
        }

        self.hashing.params()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.password_policy.min_length, 8);
        assert_eq!(settings.password_policy.max_length, 50);
        assert_eq!(settings.remember.token_bytes, 32);
        assert!(Settings::for_tests("tmp").validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let settings = Settings::default();

        let mut invalid = settings.clone();
        invalid.log_level = "loud".to_string();
        assert!(matches!(invalid.validate(), Err(AppError::Config(_))));

        let mut invalid = settings.clone();
        invalid.password_policy.min_length = 4;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.password_policy.max_length = 7;
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.password_policy.special_characters.clear();
        assert!(invalid.validate().is_err());

        let mut invalid = settings.clone();
        invalid.remember.token_bytes = 8;
        assert!(invalid.validate().is_err());

        let mut invalid = settings;
        invalid.hashing.r = 0;
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_settings_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                data_dir = "test_data"
                log_level = "debug"

                [hashing]
                log_n = 4
                r = 8
                p = 1

                [remember]
                token_bytes = 24
                "#,
            )?;
            jail.set_env("WARDEN_LOG_LEVEL", "warn");
            jail.set_env("WARDEN_EMAIL__CHECK_MAIL_EXCHANGER", "false");

            let settings = Settings::load().expect("settings should load");
            assert_eq!(settings.data_dir, PathBuf::from("test_data"));
            // Environment takes precedence over the file
            assert_eq!(settings.log_level, "warn");
            assert_eq!(settings.hashing, HashingSettings::minimum());
            assert_eq!(settings.remember.token_bytes, 24);
            assert!(!settings.email.check_mail_exchanger);
            // Untouched sections keep their defaults
            assert_eq!(settings.password_policy, PasswordPolicy::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[remember]\ntoken_bytes = 4\n")?;
            assert!(matches!(
                Settings::load_from("custom.toml"),
                Err(AppError::Config(_))
            ));
            Ok(())
        });
    }
}
