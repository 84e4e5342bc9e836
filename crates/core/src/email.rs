//! Validated email address.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{DomainError, DomainResult};

// Pragmatic shape check: local@domain.tld, no whitespace, one '@'.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email regex is valid")
});

const MAX_EMAIL_LEN: usize = 254;

/// An email address that passed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Validate and wrap an email address. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Email is required"));
        }
        if trimmed.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(trimmed) {
            return Err(DomainError::validation("Invalid email format"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for ok in ["alice@x.com", "admin@bpo.com", "first.last+tag@sub.example.org"] {
            assert!(Email::parse(ok).is_ok(), "{ok} should be accepted");
        }
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(Email::parse("  alice@x.com ").unwrap().as_str(), "alice@x.com");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["alice", "alice@", "@x.com", "alice@x", "a b@x.com", "alice@@x.com"] {
            let err = Email::parse(bad).unwrap_err();
            assert_eq!(err, DomainError::validation("Invalid email format"), "{bad}");
        }
    }

    #[test]
    fn empty_is_required_error() {
        assert_eq!(
            Email::parse("   ").unwrap_err(),
            DomainError::validation("Email is required")
        );
    }
}
