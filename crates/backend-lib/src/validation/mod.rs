// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Credential validation.
//!
//! Every rule is a plain function over the candidate record state. Anything
//! that needs I/O (email uniqueness, the mail-exchanger lookup) is resolved
//! beforehand into a [`ValidationContext`], so running the rules never
//! touches storage or the network. [`USER_RULES`] lists the rules in the
//! order they are evaluated; [`run`] executes a rule list and aggregates the
//! field errors.

pub mod email;

use std::collections::BTreeMap;
use std::fmt;

use crate::auth::password::{meets_complexity, Digester};
use crate::config::PasswordPolicy;

pub use email::{
    email_domain, is_valid_email_syntax, normalize_email, resolve_deliverability, AcceptAll,
    Deliverability, DnsHostLookup, LookupUnavailable, MailExchangerCheck,
};

pub const MSG_BLANK: &str = "can't be blank";
pub const MSG_TAKEN: &str = "has already been taken";
pub const MSG_INVALID: &str = "is invalid";
pub const MSG_INCORRECT: &str = "is incorrect";
pub const MSG_CONFIRMATION: &str = "doesn't match Password";

/// Fields that can carry a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Email,
    Password,
    PasswordConfirmation,
    OldPassword,
}

impl Field {
    /// Attribute name as rendered in error maps
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::PasswordConfirmation => "password_confirmation",
            Field::OldPassword => "old_password",
        }
    }

    /// Name used in full sentences, e.g. "Old password is incorrect"
    pub fn human_name(&self) -> &'static str {
        match self {
            Field::Email => "Email",
            Field::Password => "Password",
            Field::PasswordConfirmation => "Password confirmation",
            Field::OldPassword => "Old password",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed check on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: Field,
    pub message: String,
}

impl FieldError {
    pub fn new(field: Field, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn full_message(&self) -> String {
        format!("{} {}", self.field.human_name(), self.message)
    }
}

/// Aggregated field errors of one save attempt, in rule order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Messages attached to `field`
    pub fn on(&self, field: Field) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn contains(&self, field: Field, message: &str) -> bool {
        self.0.iter().any(|e| e.field == field && e.message == message)
    }

    /// Field name to messages, suitable for rendering
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for error in &self.0 {
            map.entry(error.field.as_str().to_string())
                .or_default()
                .push(error.message.clone());
        }
        map
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.0.iter().map(FieldError::full_message).collect()
    }

    /// `Ok(())` when no rule failed
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Extend<FieldError> for ValidationErrors {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Whether the record is being inserted or an existing one changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Create,
    Update,
}

/// Record state a save would produce, plus the plaintext claims that came with it
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub kind: SaveKind,
    pub email: &'a str,
    pub password: Option<&'a str>,
    pub password_confirmation: Option<&'a str>,
    pub old_password: Option<&'a str>,
    /// Digest stored before this save's mutations
    pub stored_password_digest: Option<&'a str>,
}

impl Candidate<'_> {
    /// The new password, unless absent or whitespace only
    pub fn new_password(&self) -> Option<&str> {
        self.password.filter(|p| !is_blank(p))
    }

    fn has_stored_digest(&self) -> bool {
        self.stored_password_digest.is_some_and(|d| !d.is_empty())
    }
}

/// Facts the rules need that were gathered ahead of time
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub policy: &'a PasswordPolicy,
    pub digester: &'a Digester,
    /// Another user already holds this email
    pub email_taken: bool,
    pub deliverability: Deliverability,
}

/// A validation rule
pub type Rule = fn(&Candidate<'_>, &ValidationContext<'_>) -> Vec<FieldError>;

/// Rules applied to every user save, in evaluation order
pub const USER_RULES: &[Rule] = &[
    password_length,
    password_confirmation,
    password_presence,
    correct_old_password,
    password_complexity,
    email_rules,
];

/// Run `rules` in order and collect every error
pub fn run(
    rules: &[Rule],
    candidate: &Candidate<'_>,
    context: &ValidationContext<'_>,
) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    for rule in rules {
        errors.extend(rule(candidate, context));
    }
    errors
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn password_length(candidate: &Candidate<'_>, ctx: &ValidationContext<'_>) -> Vec<FieldError> {
    let Some(password) = candidate.new_password() else {
        return Vec::new();
    };
    let length = password.chars().count();

    if length < ctx.policy.min_length {
        vec![FieldError::new(
            Field::Password,
            format!(
                "is too short (minimum is {} characters)",
                ctx.policy.min_length
            ),
        )]
    } else if length > ctx.policy.max_length {
        vec![FieldError::new(
            Field::Password,
            format!(
                "is too long (maximum is {} characters)",
                ctx.policy.max_length
            ),
        )]
    } else {
        Vec::new()
    }
}

/// Skipped when no confirmation was supplied
pub fn password_confirmation(
    candidate: &Candidate<'_>,
    _ctx: &ValidationContext<'_>,
) -> Vec<FieldError> {
    match (candidate.new_password(), candidate.password_confirmation) {
        (Some(password), Some(confirmation)) if password != confirmation => {
            vec![FieldError::new(Field::PasswordConfirmation, MSG_CONFIRMATION)]
        }
        _ => Vec::new(),
    }
}

/// A record without a stored digest must come with a password
pub fn password_presence(
    candidate: &Candidate<'_>,
    _ctx: &ValidationContext<'_>,
) -> Vec<FieldError> {
    if candidate.new_password().is_none() && !candidate.has_stored_digest() {
        vec![FieldError::new(Field::Password, MSG_BLANK)]
    } else {
        Vec::new()
    }
}

/// On update, changing the password requires the current one
pub fn correct_old_password(
    candidate: &Candidate<'_>,
    ctx: &ValidationContext<'_>,
) -> Vec<FieldError> {
    if candidate.kind != SaveKind::Update || candidate.new_password().is_none() {
        return Vec::new();
    }

    let matches = match (candidate.stored_password_digest, candidate.old_password) {
        (Some(digest), Some(old)) => ctx.digester.verify(digest, old),
        _ => false,
    };

    if matches {
        Vec::new()
    } else {
        vec![FieldError::new(Field::OldPassword, MSG_INCORRECT)]
    }
}

pub fn password_complexity(
    candidate: &Candidate<'_>,
    ctx: &ValidationContext<'_>,
) -> Vec<FieldError> {
    match candidate.new_password() {
        Some(password) if !meets_complexity(password, ctx.policy) => {
            vec![FieldError::new(Field::Password, complexity_message(ctx.policy))]
        }
        _ => Vec::new(),
    }
}

/// Describes every requirement, using the configured length bounds
pub fn complexity_message(policy: &PasswordPolicy) -> String {
    format!(
        "complexity requirement not met. Length should be {}-{} characters and include: \
         1 uppercase, 1 lowercase, 1 digit and 1 special character",
        policy.min_length, policy.max_length
    )
}

pub fn email_rules(candidate: &Candidate<'_>, ctx: &ValidationContext<'_>) -> Vec<FieldError> {
    if is_blank(candidate.email) {
        return vec![FieldError::new(Field::Email, MSG_BLANK)];
    }

    let mut errors = Vec::new();
    if ctx.email_taken {
        errors.push(FieldError::new(Field::Email, MSG_TAKEN));
    }
    if !is_valid_email_syntax(candidate.email)
        || ctx.deliverability == Deliverability::Undeliverable
    {
        errors.push(FieldError::new(Field::Email, MSG_INVALID));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingSettings;

    fn digester() -> Digester {
        Digester::new(&HashingSettings::minimum()).unwrap()
    }

    fn create(password: Option<&str>) -> Candidate<'_> {
        Candidate {
            kind: SaveKind::Create,
            email: "lifter@example.com",
            password,
            password_confirmation: None,
            old_password: None,
            stored_password_digest: None,
        }
    }

    fn context<'a>(policy: &'a PasswordPolicy, digester: &'a Digester) -> ValidationContext<'a> {
        ValidationContext {
            policy,
            digester,
            email_taken: false,
            deliverability: Deliverability::Unknown,
        }
    }

    #[test]
    fn test_valid_password_passes_every_rule() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let errors = run(USER_RULES, &create(Some("Abcd123!")), &context(&policy, &digester));
        assert!(errors.is_empty(), "unexpected errors: {errors}");
    }

    #[test]
    fn test_lowercase_only_password_fails_complexity() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let errors = run(USER_RULES, &create(Some("abcdefgh")), &context(&policy, &digester));

        let message = complexity_message(&policy);
        assert_eq!(errors.on(Field::Password), vec![message.as_str()]);
        assert!(message.contains("8-50"));
    }

    #[test]
    fn test_length_bounds() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let ctx = context(&policy, &digester);

        let fifty_one = format!("A1!{}", "a".repeat(48));
        assert_eq!(fifty_one.chars().count(), 51);
        let errors = run(USER_RULES, &create(Some(&fifty_one)), &ctx);
        assert_eq!(
            errors.on(Field::Password),
            vec!["is too long (maximum is 50 characters)"]
        );

        let fifty = format!("A1!{}", "a".repeat(47));
        assert!(run(USER_RULES, &create(Some(&fifty)), &ctx).is_empty());

        let errors = run(USER_RULES, &create(Some("Ab1!")), &ctx);
        assert!(errors.contains(Field::Password, "is too short (minimum is 8 characters)"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        // 8 characters, 10 bytes
        let errors = run(USER_RULES, &create(Some("Ábcd12!é")), &context(&policy, &digester));
        assert!(errors.on(Field::Password).iter().all(|m| !m.starts_with("is too")));
    }

    #[test]
    fn test_complexity_needs_each_class() {
        let policy = PasswordPolicy::default();
        assert!(meets_complexity("Abcd123!", &policy));
        assert!(!meets_complexity("abcd123!", &policy));
        assert!(!meets_complexity("ABCD123!", &policy));
        assert!(!meets_complexity("Abcdefg!", &policy));
        assert!(!meets_complexity("Abcd1234", &policy));
        // Outside the special set
        assert!(!meets_complexity("Abcd123_", &policy));
        assert!(!meets_complexity("Abcd123~", &policy));
        for special in policy.special_characters.chars() {
            assert!(meets_complexity(&format!("Abcd123{special}"), &policy));
        }
    }

    #[test]
    fn test_missing_password_on_create_is_blank() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let ctx = context(&policy, &digester);

        for password in [None, Some(""), Some("   ")] {
            let errors = run(USER_RULES, &create(password), &ctx);
            assert_eq!(errors.on(Field::Password), vec![MSG_BLANK]);
        }
    }

    #[test]
    fn test_update_without_password_keeps_existing_digest() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let digest = digester.digest("Abcd123!").unwrap();
        let candidate = Candidate {
            kind: SaveKind::Update,
            stored_password_digest: Some(&digest),
            ..create(None)
        };
        assert!(run(USER_RULES, &candidate, &context(&policy, &digester)).is_empty());
    }

    #[test]
    fn test_confirmation() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let ctx = context(&policy, &digester);

        let mismatch = Candidate {
            password_confirmation: Some("Abcd123?"),
            ..create(Some("Abcd123!"))
        };
        assert_eq!(
            run(USER_RULES, &mismatch, &ctx).on(Field::PasswordConfirmation),
            vec![MSG_CONFIRMATION]
        );

        let matching = Candidate {
            password_confirmation: Some("Abcd123!"),
            ..create(Some("Abcd123!"))
        };
        assert!(run(USER_RULES, &matching, &ctx).is_empty());

        // No confirmation supplied: check skipped
        assert!(run(USER_RULES, &create(Some("Abcd123!")), &ctx).is_empty());
    }

    #[test]
    fn test_old_password_checked_only_on_update_with_new_password() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let ctx = context(&policy, &digester);
        let digest = digester.digest("Old-pass1").unwrap();

        let update = Candidate {
            kind: SaveKind::Update,
            stored_password_digest: Some(&digest),
            ..create(Some("New-pass1"))
        };

        let missing = run(USER_RULES, &update, &ctx);
        assert_eq!(missing.on(Field::OldPassword), vec![MSG_INCORRECT]);

        let wrong = Candidate {
            old_password: Some("Wrong-pass1"),
            ..update
        };
        assert_eq!(run(USER_RULES, &wrong, &ctx).on(Field::OldPassword), vec![MSG_INCORRECT]);

        let right = Candidate {
            old_password: Some("Old-pass1"),
            ..update
        };
        assert!(run(USER_RULES, &right, &ctx).is_empty());

        // Never evaluated on create
        let on_create = Candidate {
            old_password: Some("whatever"),
            ..create(Some("New-pass1"))
        };
        assert!(run(USER_RULES, &on_create, &ctx).on(Field::OldPassword).is_empty());
    }

    #[test]
    fn test_old_password_against_corrupt_digest_is_incorrect() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let update = Candidate {
            kind: SaveKind::Update,
            stored_password_digest: Some("not-a-phc-string"),
            old_password: Some("Old-pass1"),
            ..create(Some("New-pass1"))
        };
        let errors = run(USER_RULES, &update, &context(&policy, &digester));
        assert_eq!(errors.on(Field::OldPassword), vec![MSG_INCORRECT]);
    }

    #[test]
    fn test_email_rules() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let ctx = context(&policy, &digester);

        let blank = Candidate {
            email: " ",
            ..create(Some("Abcd123!"))
        };
        assert_eq!(run(USER_RULES, &blank, &ctx).on(Field::Email), vec![MSG_BLANK]);

        let malformed = Candidate {
            email: "lifter.example.com",
            ..create(Some("Abcd123!"))
        };
        assert_eq!(run(USER_RULES, &malformed, &ctx).on(Field::Email), vec![MSG_INVALID]);

        let taken = ValidationContext {
            email_taken: true,
            ..ctx
        };
        assert_eq!(
            run(USER_RULES, &create(Some("Abcd123!")), &taken).on(Field::Email),
            vec![MSG_TAKEN]
        );

        let undeliverable = ValidationContext {
            deliverability: Deliverability::Undeliverable,
            ..ctx
        };
        assert_eq!(
            run(USER_RULES, &create(Some("Abcd123!")), &undeliverable).on(Field::Email),
            vec![MSG_INVALID]
        );

        let deliverable = ValidationContext {
            deliverability: Deliverability::Deliverable,
            ..ctx
        };
        assert!(run(USER_RULES, &create(Some("Abcd123!")), &deliverable).is_empty());
    }

    #[test]
    fn test_errors_aggregate_across_rules() {
        let policy = PasswordPolicy::default();
        let digester = digester();
        let candidate = Candidate {
            email: "",
            password_confirmation: Some("different"),
            ..create(Some("short"))
        };
        let errors = run(USER_RULES, &candidate, &context(&policy, &digester));

        let map = errors.to_map();
        assert_eq!(map["password"].len(), 2);
        assert_eq!(map["password_confirmation"], vec![MSG_CONFIRMATION.to_string()]);
        assert_eq!(map["email"], vec![MSG_BLANK.to_string()]);
        assert_eq!(
            errors.full_messages()[0],
            "Password is too short (minimum is 8 characters)"
        );
        assert!(errors.clone().into_result().is_err());
        assert!(ValidationErrors::default().into_result().is_ok());
    }
}
