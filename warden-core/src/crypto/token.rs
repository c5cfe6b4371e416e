//! Access token signing/verification (C2). Asymmetric EdDSA (Ed25519) so
//! verification never needs the signing key, unlike the HS256 scheme this
//! module replaces.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{DomainError, ErrorKind};
use crate::value_objects::refresh_token::{RefreshToken, RefreshTokenError, hash_refresh_value};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("access token expired")]
    Expired,
    #[error("access token signature invalid")]
    BadSignature,
    #[error("access token claims malformed")]
    BadClaims,
    #[error(transparent)]
    Refresh(#[from] RefreshTokenError),
}

impl DomainError for TokenError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Expired => ErrorKind::Expired,
            Self::BadSignature | Self::BadClaims => ErrorKind::Invalid,
            Self::Refresh(_) => ErrorKind::Internal,
        }
    }
}

/// Claims carried by an access token, per the bearer contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub org_id: Uuid,
    pub session_id: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

pub struct IssuedAccess {
    pub token: String,
    pub jti: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct IssuedRefresh {
    pub token: RefreshToken,
    pub hash: String,
}

/// Signs and verifies access tokens, and mints/hashes opaque refresh
/// tokens. Holds an Ed25519 keypair read from PEM at startup (§6).
#[derive(Clone)]
pub struct TokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

const CLOCK_SKEW_SECONDS: u64 = 60;

impl TokenProvider {
    pub fn new(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, TokenError> {
        let encoding_key =
            EncodingKey::from_ed_pem(private_key_pem).map_err(|_| TokenError::BadSignature)?;
        let decoding_key =
            DecodingKey::from_ed_pem(public_key_pem).map_err(|_| TokenError::BadSignature)?;
        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.into(),
            audience: audience.into(),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn issue_access(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        session_id: Uuid,
    ) -> Result<IssuedAccess, TokenError> {
        let now = Utc::now();
        let exp = now + self.access_ttl;
        let jti = Uuid::new_v4().to_string();
        let claims = Claims {
            sub: user_id,
            org_id,
            session_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: jti.clone(),
        };
        let token = encode(
            &Header::new(Algorithm::EdDSA),
            &claims,
            &self.encoding_key,
        )
        .map_err(|_| TokenError::BadSignature)?;
        Ok(IssuedAccess {
            token,
            jti,
            expires_at: exp,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = CLOCK_SKEW_SECONDS;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            use jsonwebtoken::errors::ErrorKind as JK;
            match err.kind() {
                JK::ExpiredSignature => TokenError::Expired,
                JK::InvalidSignature | JK::InvalidEcdsaKey | JK::InvalidRsaKey(_) => {
                    TokenError::BadSignature
                }
                _ => TokenError::BadClaims,
            }
        })?;
        Ok(data.claims)
    }

    pub fn issue_refresh(&self) -> Result<IssuedRefresh, TokenError> {
        let token = RefreshToken::generate(self.refresh_ttl)?;
        let hash = token.hash();
        Ok(IssuedRefresh { token, hash })
    }

    /// Mints the next token in an existing rotation family. Only the
    /// family's identity and last generation need to be known; the
    /// previous secret itself was never persisted.
    pub fn rotate_refresh(
        &self,
        family_id: Uuid,
        previous_generation: u32,
    ) -> Result<IssuedRefresh, TokenError> {
        let token = RefreshToken::next_in_family(family_id, previous_generation, self.refresh_ttl)?;
        let hash = token.hash();
        Ok(IssuedRefresh { token, hash })
    }

    pub fn hash_refresh(&self, plaintext: &str) -> String {
        hash_refresh_value(plaintext)
    }

    pub fn verify_refresh(&self, plaintext: &str, hash: &str) -> bool {
        constant_time_eq::constant_time_eq(
            self.hash_refresh(plaintext).as_bytes(),
            hash.as_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_keys() -> (Vec<u8>, Vec<u8>) {
        // A fixed Ed25519 test keypair, PKCS8/SPKI PEM (not used outside tests).
        let private = include_bytes!("../../testdata/ed25519_private.pem").to_vec();
        let public = include_bytes!("../../testdata/ed25519_public.pem").to_vec();
        (private, public)
    }

    #[test]
    fn issues_and_verifies_access_tokens() {
        let (private, public) = test_keys();
        let provider = TokenProvider::new(
            &private,
            &public,
            "warden",
            "warden-clients",
            Duration::minutes(15),
            Duration::hours(168),
        )
        .unwrap();

        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let issued = provider.issue_access(user_id, org_id, session_id).unwrap();
        let claims = provider.verify_access(&issued.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.org_id, org_id);
        assert_eq!(claims.session_id, session_id);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn refresh_hash_round_trips() {
        let (private, public) = test_keys();
        let provider = TokenProvider::new(
            &private,
            &public,
            "warden",
            "warden-clients",
            Duration::minutes(15),
            Duration::hours(168),
        )
        .unwrap();

        let issued = provider.issue_refresh().unwrap();
        assert!(provider.verify_refresh(issued.token.value(), &issued.hash));
        assert!(!provider.verify_refresh("some-other-value", &issued.hash));
    }
}
