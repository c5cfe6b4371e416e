//! Six-digit OTP codes for MFA challenges (C6). Mirrors the PIN value
//! object's hash/verify shape: only the Argon2id digest is ever stored.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use ring::constant_time;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("otp generation failed")]
    GenerationFailed,
    #[error("otp hashing failed")]
    HashingFailed,
}

impl DomainError for OtpError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct OtpValue(String);

/// A one-time passcode, held only long enough to deliver and hash it.
pub struct GeneratedOtp {
    pub plaintext: String,
    pub hash: String,
}

pub fn generate_otp() -> Result<GeneratedOtp, OtpError> {
    let mut rng = rand::rng();
    let code = rng.next_u32() % 1_000_000;
    let mut plaintext = OtpValue(format!("{code:06}"));
    let hash = hash_otp(&plaintext.0)?;
    let plaintext_copy = plaintext.0.clone();
    plaintext.zeroize();
    Ok(GeneratedOtp {
        plaintext: plaintext_copy,
        hash,
    })
}

pub fn hash_otp(code: &str) -> Result<String, OtpError> {
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut salt_bytes = [0u8; 16];
    rng.fill(&mut salt_bytes)
        .map_err(|_| OtpError::GenerationFailed)?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|_| OtpError::HashingFailed)?;
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(code.as_bytes(), &salt)
        .map_err(|_| OtpError::HashingFailed)?
        .to_string();
    Ok(hash)
}

/// Constant-time verification of a presented OTP against a stored digest.
pub fn verify_otp(code: &str, hash: &str) -> bool {
    let mut otp_value = OtpValue(code.to_string());
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        otp_value.zeroize();
        return false;
    };
    let argon2 = Argon2::default();
    let result = argon2.verify_password(otp_value.0.as_bytes(), &parsed_hash);
    let observed = if result.is_ok() { 1u8 } else { 0u8 };
    let is_equal = constant_time::verify_slices_are_equal(&[observed], &[1u8]);
    otp_value.zeroize();
    is_equal.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_otp_is_six_digits() {
        let otp = generate_otp().unwrap();
        assert_eq!(otp.plaintext.len(), 6);
        assert!(otp.plaintext.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn verifies_correct_and_rejects_wrong() {
        let otp = generate_otp().unwrap();
        assert!(verify_otp(&otp.plaintext, &otp.hash));
        let wrong = if otp.plaintext == "000000" {
            "111111"
        } else {
            "000000"
        };
        assert!(!verify_otp(wrong, &otp.hash));
    }
}
