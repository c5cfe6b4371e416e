use std::fmt;

/// The small, closed set of ways a domain operation can fail.
///
/// Every `thiserror`-derived error in this crate maps onto one of these
/// kinds so the HTTP boundary in `warden-server` can collapse them into a
/// single status-code table without matching on error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    Expired,
    AlreadyExists,
    NotFound,
    Forbidden,
    Validation,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::AlreadyExists => "already_exists",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Validation => "validation",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Implemented by every domain/service error enum so the boundary layer can
/// ask "what kind of failure is this" without downcasting.
pub trait DomainError: std::error::Error {
    fn kind(&self) -> ErrorKind;
}
