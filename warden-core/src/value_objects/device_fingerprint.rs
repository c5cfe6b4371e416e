//! Device fingerprints identify the `(user, org, fingerprint)` device
//! tuple. Unlike the hardware-derived fingerprint this is adapted from,
//! the value here is an opaque string supplied by the client at login
//! time — validated for shape, never parsed for hardware components.

use std::fmt;

use thiserror::Error;

use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum DeviceFingerprintError {
    #[error("device fingerprint must not be empty")]
    Empty,
    #[error("device fingerprint exceeds maximum length of {max}")]
    TooLong { max: usize },
}

impl DomainError for DeviceFingerprintError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

const MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    pub fn new(raw: impl Into<String>) -> Result<Self, DeviceFingerprintError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DeviceFingerprintError::Empty);
        }
        if raw.len() > MAX_LEN {
            return Err(DeviceFingerprintError::TooLong { max: MAX_LEN });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceFingerprint {
    /// Never print the full fingerprint in logs; a short prefix is enough
    /// to correlate without leaking the full device identifier.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.0.chars().take(8).collect();
        write!(f, "{preview}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_fingerprint() {
        assert!(matches!(
            DeviceFingerprint::new(""),
            Err(DeviceFingerprintError::Empty)
        ));
        assert!(matches!(
            DeviceFingerprint::new("   "),
            Err(DeviceFingerprintError::Empty)
        ));
    }

    #[test]
    fn rejects_oversized_fingerprint() {
        let huge = "a".repeat(MAX_LEN + 1);
        assert!(matches!(
            DeviceFingerprint::new(huge),
            Err(DeviceFingerprintError::TooLong { .. })
        ));
    }

    #[test]
    fn display_truncates_for_privacy() {
        let fp = DeviceFingerprint::new("abcdefghijklmnop").unwrap();
        assert_eq!(fp.to_string(), "abcdefgh...");
    }
}
