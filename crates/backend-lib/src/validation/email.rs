//! Email syntax and deliverability checks.

use std::io;
use std::net::SocketAddr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit

/// Port used when resolving a domain; only the address records matter
const SMTP_PORT: u16 = 25;

/// Resolver answers meaning the name does not exist (glibc, musl, BSD/macOS).
/// Anything else, e.g. "Temporary failure in name resolution", is an outage.
const NO_SUCH_DOMAIN: [&str; 4] = [
    "Name or service not known",
    "No address associated with hostname",
    "nodename nor servname provided",
    "Name does not resolve",
];

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex compiles")
});

/// Outcome of the mail-exchanger heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deliverability {
    Deliverable,
    Undeliverable,
    /// Lookup skipped or unavailable; syntax alone decides
    Unknown,
}

#[derive(Debug, Error)]
#[error("mail exchanger lookup unavailable: {0}")]
pub struct LookupUnavailable(pub String);

/// Decides whether a domain can receive mail
#[async_trait]
pub trait MailExchangerCheck: Send + Sync {
    /// `Ok(false)` only when the domain is known not to route mail
    async fn check(&self, domain: &str) -> Result<bool, LookupUnavailable>;
}

/// Resolves the domain through the system resolver.
///
/// Any resolved address counts as deliverable; a name the resolver reports
/// as nonexistent does not. Other resolver errors and timeouts are reported
/// as unavailable, so callers fall back to syntax checking.
#[derive(Debug, Clone, Copy)]
pub struct DnsHostLookup {
    timeout: Duration,
}

impl DnsHostLookup {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MailExchangerCheck for DnsHostLookup {
    async fn check(&self, domain: &str) -> Result<bool, LookupUnavailable> {
        let lookup = tokio::net::lookup_host((domain, SMTP_PORT));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => lookup_outcome(result),
            Err(_) => Err(LookupUnavailable(format!(
                "no answer within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn is_no_such_domain(error: &io::Error) -> bool {
    let message = error.to_string();
    NO_SUCH_DOMAIN.iter().any(|known| message.contains(known))
}

fn lookup_outcome<I>(result: io::Result<I>) -> Result<bool, LookupUnavailable>
where
    I: Iterator<Item = SocketAddr>,
{
    match result {
        Ok(mut addrs) => Ok(addrs.next().is_some()),
        Err(e) if is_no_such_domain(&e) => Ok(false),
        Err(e) => Err(LookupUnavailable(e.to_string())),
    }
}

/// Treats every domain as deliverable
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl MailExchangerCheck for AcceptAll {
    async fn check(&self, _domain: &str) -> Result<bool, LookupUnavailable> {
        Ok(true)
    }
}

/// Canonical stored form: trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email_syntax(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LENGTH && EMAIL_REGEX.is_match(email)
}

/// Domain part of a syntactically valid address
pub fn email_domain(email: &str) -> Option<&str> {
    if !is_valid_email_syntax(email) {
        return None;
    }
    email.rsplit_once('@').map(|(_, domain)| domain)
}

/// Run the heuristic, degrading to [`Deliverability::Unknown`] when it cannot answer
pub async fn resolve_deliverability(
    check: &dyn MailExchangerCheck,
    email: &str,
) -> Deliverability {
    let Some(domain) = email_domain(email) else {
        return Deliverability::Unknown;
    };

    match check.check(domain).await {
        Ok(true) => Deliverability::Deliverable,
        Ok(false) => {
            debug!(%domain, "email domain does not route mail");
            Deliverability::Undeliverable
        }
        Err(e) => {
            warn!(%domain, error = %e, "falling back to syntax-only email validation");
            Deliverability::Unknown
        }
    }
}
