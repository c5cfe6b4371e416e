use std::fmt;

use thiserror::Error;

use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email address is malformed")]
    Malformed,
}

impl DomainError for EmailError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// A normalised (lowercased, trimmed) email address. Users are looked up
/// and stored by this normalised form so case differences never produce
/// duplicate identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let trimmed = raw.trim();
        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(EmailError::Malformed);
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@')
        {
            return Err(EmailError::Malformed);
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalises_case_and_whitespace() {
        let email = Email::parse("  Dev@Example.COM  ").unwrap();
        assert_eq!(email.as_str(), "dev@example.com");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(Email::parse("not-an-email").is_err());
        assert!(Email::parse("@example.com").is_err());
        assert!(Email::parse("dev@").is_err());
        assert!(Email::parse("dev@nodot").is_err());
    }
}
