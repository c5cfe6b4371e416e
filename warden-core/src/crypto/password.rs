//! Credential hasher (C1): Argon2id password hashing with a tunable cost.

use argon2::{
    Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use ring::{constant_time, rand::{SecureRandom, SystemRandom}};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password does not meet policy requirements")]
    PolicyViolation,
    #[error("password hashing failed")]
    HashingFailed,
    #[error("stored password digest is malformed")]
    MalformedDigest,
    #[error("cost factor out of range [4, 31]")]
    InvalidCost,
}

impl DomainError for PasswordError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::PolicyViolation => ErrorKind::Validation,
            Self::MalformedDigest => ErrorKind::Invalid,
            Self::HashingFailed | Self::InvalidCost => ErrorKind::Internal,
        }
    }
}

/// Register password policy: at least 12 characters, one of each class.
pub fn validate_password_policy(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < 12 {
        return Err(PasswordError::PolicyViolation);
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(PasswordError::PolicyViolation)
    }
}

/// Zeroizing wrapper so a plaintext password never outlives its use.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SecretString(String);

/// Maps the historical `BCRYPT_COST` knob (4..=31) onto Argon2id's memory
/// cost in KiB. The scale is deliberately coarse: callers only need "more
/// expensive" to move monotonically with the configured value.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    m_cost_kib: u32,
    t_cost: u32,
    p_cost: u32,
}

impl HashCost {
    pub fn from_bcrypt_cost(cost: u32) -> Result<Self, PasswordError> {
        if !(4..=31).contains(&cost) {
            return Err(PasswordError::InvalidCost);
        }
        // cost=10 (a typical bcrypt default) lands near Argon2's own
        // recommended interactive baseline (19 MiB, t=2); scale linearly
        // from there so raising BCRYPT_COST still raises real work.
        let m_cost_kib = (19 * 1024 * cost.max(1)) / 10;
        Ok(Self {
            m_cost_kib,
            t_cost: 2,
            p_cost: 1,
        })
    }
}

impl Default for HashCost {
    fn default() -> Self {
        Self::from_bcrypt_cost(10).expect("10 is in range")
    }
}

/// Hashes and verifies passwords with Argon2id.
///
/// Verification runs through an additional constant-time byte comparison
/// on top of Argon2's own constant-time internals so a mismatch never
/// resolves through an early return.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(cost: HashCost) -> Self {
        let params = Params::new(cost.m_cost_kib, cost.t_cost, cost.p_cost, None)
            .unwrap_or_else(|_| Params::default());
        Self { params }
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let secret = SecretString(password.to_string());
        let rng = SystemRandom::new();
        let mut salt_bytes = [0u8; 16];
        rng.fill(&mut salt_bytes)
            .map_err(|_| PasswordError::HashingFailed)?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|_| PasswordError::HashingFailed)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let digest = argon2
            .hash_password(secret.0.as_bytes(), &salt)
            .map_err(|_| PasswordError::HashingFailed)?
            .to_string();
        Ok(digest)
    }

    pub fn verify(&self, password: &str, digest: &str) -> Result<bool, PasswordError> {
        let secret = SecretString(password.to_string());
        let parsed = PasswordHash::new(digest).map_err(|_| PasswordError::MalformedDigest)?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let result = argon2.verify_password(secret.0.as_bytes(), &parsed);

        let observed = if result.is_ok() { 1u8 } else { 0u8 };
        let is_equal = constant_time::verify_slices_are_equal(&[observed], &[1u8]);
        Ok(is_equal.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_not_identity() {
        let hasher = CredentialHasher::new(HashCost::default());
        let digest = hasher.hash("Password123!").unwrap();
        assert_ne!(digest, "Password123!");
    }

    #[test]
    fn verify_accepts_correct_and_rejects_wrong() {
        let hasher = CredentialHasher::new(HashCost::default());
        let digest = hasher.hash("Password123!").unwrap();
        assert!(hasher.verify("Password123!", &digest).unwrap());
        assert!(!hasher.verify("WrongPassword456$", &digest).unwrap());
    }

    #[test]
    fn malformed_digest_is_an_error_not_a_false() {
        let hasher = CredentialHasher::new(HashCost::default());
        assert!(hasher.verify("whatever", "not-a-digest").is_err());
    }

    #[test]
    fn policy_requires_length_and_character_classes() {
        assert!(validate_password_policy("Password123!").is_ok());
        assert!(validate_password_policy("short1!").is_err());
        assert!(validate_password_policy("alllowercase123!").is_err());
        assert!(validate_password_policy("ALLUPPERCASE123!").is_err());
        assert!(validate_password_policy("NoDigitsHere!!!!").is_err());
        assert!(validate_password_policy("NoSymbolsHere1234").is_err());
    }

    #[test]
    fn invalid_cost_is_rejected() {
        assert!(HashCost::from_bcrypt_cost(3).is_err());
        assert!(HashCost::from_bcrypt_cost(32).is_err());
        assert!(HashCost::from_bcrypt_cost(10).is_ok());
    }
}
