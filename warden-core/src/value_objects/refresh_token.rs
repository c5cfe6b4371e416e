//! Opaque refresh tokens (C2). The server stores only a jti and a hash;
//! the plaintext value exists only long enough to hand it to the client.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("refresh token generation failed")]
    GenerationFailed,
}

impl DomainError for RefreshTokenError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

const TOKEN_BYTES: usize = 32;

/// An opaque, high-entropy refresh secret plus the bookkeeping needed for
/// rotation and reuse detection. `family_id` is stable across rotations of
/// the same session; `generation` increments on every rotation so a stale
/// presented secret can be recognised even if some other guard missed it.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    value: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    family_id: Uuid,
    generation: u32,
}

impl RefreshToken {
    pub fn generate(ttl: Duration) -> Result<Self, RefreshTokenError> {
        let now = Utc::now();
        Ok(Self {
            value: random_secret()?,
            issued_at: now,
            expires_at: now + ttl,
            family_id: Uuid::now_v7(),
            generation: 1,
        })
    }

    /// Produces the next token in the same rotation family. The previous
    /// secret is never persisted, so continuing a family only needs its
    /// `family_id` and last `generation`, not the token itself.
    pub fn next_in_family(
        family_id: Uuid,
        previous_generation: u32,
        ttl: Duration,
    ) -> Result<Self, RefreshTokenError> {
        let now = Utc::now();
        Ok(Self {
            value: random_secret()?,
            issued_at: now,
            expires_at: now + ttl,
            family_id,
            generation: previous_generation + 1,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn family_id(&self) -> Uuid {
        self.family_id
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// SHA-256 over the opaque value; this is what repositories persist.
    pub fn hash(&self) -> String {
        hash_refresh_value(&self.value)
    }
}

pub fn hash_refresh_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

fn random_secret() -> Result<String, RefreshTokenError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| RefreshTokenError::GenerationFailed)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: String = self.value.chars().take(8).collect();
        write!(f, "{preview}...")
    }
}

impl Drop for RefreshToken {
    fn drop(&mut self) {
        unsafe {
            self.value.as_mut_vec().fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_tokens_with_fresh_family() {
        let a = RefreshToken::generate(Duration::hours(1)).unwrap();
        let b = RefreshToken::generate(Duration::hours(1)).unwrap();
        assert_ne!(a.value(), b.value());
        assert_ne!(a.family_id(), b.family_id());
        assert_eq!(a.generation(), 1);
    }

    #[test]
    fn rotation_keeps_family_and_bumps_generation() {
        let first = RefreshToken::generate(Duration::hours(1)).unwrap();
        let second =
            RefreshToken::next_in_family(first.family_id(), first.generation(), Duration::hours(1))
                .unwrap();
        assert_eq!(first.family_id(), second.family_id());
        assert_eq!(second.generation(), 2);
        assert_ne!(first.value(), second.value());
        assert_ne!(first.hash(), second.hash());
    }

    #[test]
    fn hash_is_deterministic_for_the_same_value() {
        let token = RefreshToken::generate(Duration::hours(1)).unwrap();
        assert_eq!(token.hash(), hash_refresh_value(token.value()));
    }

    #[test]
    fn expiry_is_relative_to_generation_time() {
        let token = RefreshToken::generate(Duration::seconds(-1)).unwrap();
        assert!(token.is_expired(Utc::now()));
    }
}
