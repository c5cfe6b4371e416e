//! MFA orchestrator (C6): OTP generation, delivery, and verification via
//! challenges/intents, plus the in-process dev-OTP parking store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::mfa::MfaChallenge;
use crate::error::{DomainError, ErrorKind};
use crate::repositories::MfaChallengeRepository;
use crate::value_objects::otp_code::{generate_otp, verify_otp};

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("mfa challenge not found")]
    NotFound,
    #[error("mfa challenge expired")]
    Expired,
    #[error("otp did not match")]
    Mismatch,
    #[error("otp generation failed")]
    GenerationFailed,
    #[error("otp delivery failed: {0}")]
    DeliveryFailed(anyhow::Error),
    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl DomainError for MfaError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Expired => ErrorKind::Expired,
            Self::Mismatch => ErrorKind::Invalid,
            Self::GenerationFailed | Self::DeliveryFailed(_) | Self::Repository(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Sends an OTP to a phone number. A no-op implementation is used when no
/// SMS transport is configured (§6: `SMS_API_KEY` absent).
#[async_trait::async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, phone: &str, code: &str) -> anyhow::Result<()>;
}

pub struct NoopOtpSender;

#[async_trait::async_trait]
impl OtpSender for NoopOtpSender {
    async fn send(&self, _phone: &str, _code: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct ReqwestOtpSender {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    sender: String,
}

impl ReqwestOtpSender {
    pub fn new(base_url: String, api_key: String, sender: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(StdDuration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url,
            api_key,
            sender,
        }
    }
}

#[async_trait::async_trait]
impl OtpSender for ReqwestOtpSender {
    async fn send(&self, phone: &str, code: &str) -> anyhow::Result<()> {
        self.client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.sender,
                "to": phone,
                "body": format!("Your verification code is {code}"),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

const CHALLENGE_TTL_MINUTES: i64 = 10;

struct ParkedOtp {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Orchestrates challenge lifecycle: create, verify, and (in dev mode)
/// park the plaintext OTP in a concurrent TTL-pruned map so a developer
/// can retrieve it without a real SMS transport.
pub struct MfaOrchestrator {
    challenges: Arc<dyn MfaChallengeRepository>,
    sender: Arc<dyn OtpSender>,
    dev_otp_enabled: bool,
    dev_store: DashMap<Uuid, ParkedOtp>,
}

impl MfaOrchestrator {
    pub fn new(
        challenges: Arc<dyn MfaChallengeRepository>,
        sender: Arc<dyn OtpSender>,
        dev_otp_enabled: bool,
    ) -> Self {
        Self {
            challenges,
            sender,
            dev_otp_enabled,
            dev_store: DashMap::new(),
        }
    }

    pub async fn create_challenge(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        device_id: Uuid,
        phone: String,
    ) -> Result<Uuid, MfaError> {
        let generated = generate_otp().map_err(|_| MfaError::GenerationFailed)?;
        let now = Utc::now();
        let challenge = MfaChallenge {
            id: Uuid::new_v4(),
            user_id,
            org_id,
            device_id,
            phone: phone.clone(),
            code_hash: generated.hash,
            expires_at: now + Duration::minutes(CHALLENGE_TTL_MINUTES),
            created_at: now,
        };

        self.challenges.save(&challenge).await?;

        if self.dev_otp_enabled {
            self.dev_store.insert(
                challenge.id,
                ParkedOtp {
                    code: generated.plaintext.clone(),
                    expires_at: challenge.expires_at,
                },
            );
        }

        self.sender
            .send(&phone, &generated.plaintext)
            .await
            .map_err(MfaError::DeliveryFailed)?;

        Ok(challenge.id)
    }

    pub async fn verify(&self, challenge_id: Uuid, otp: &str) -> Result<MfaChallenge, MfaError> {
        let challenge = self
            .challenges
            .find_by_id(challenge_id)
            .await?
            .ok_or(MfaError::NotFound)?;

        if challenge.is_expired(Utc::now()) {
            self.challenges.delete(challenge_id).await?;
            self.dev_store.remove(&challenge_id);
            return Err(MfaError::Expired);
        }

        if !verify_otp(otp, &challenge.code_hash) {
            return Err(MfaError::Mismatch);
        }

        self.challenges.delete(challenge_id).await?;
        self.dev_store.remove(&challenge_id);
        Ok(challenge)
    }

    /// Dev-only retrieval path (§6 `warden.DevService/GetOTP`).
    pub fn dev_peek(&self, challenge_id: Uuid) -> Option<String> {
        if !self.dev_otp_enabled {
            return None;
        }
        let entry = self.dev_store.get(&challenge_id)?;
        if entry.expires_at <= Utc::now() {
            warn!(%challenge_id, "dev otp peeked past expiry");
            return None;
        }
        Some(entry.code.clone())
    }

    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.dev_store.retain(|_, parked| parked.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::InMemoryMfaChallenges;

    fn orchestrator(dev_enabled: bool) -> MfaOrchestrator {
        MfaOrchestrator::new(
            Arc::new(InMemoryMfaChallenges::default()),
            Arc::new(NoopOtpSender),
            dev_enabled,
        )
    }

    #[tokio::test]
    async fn create_then_verify_succeeds() {
        let orchestrator = orchestrator(true);
        let challenge_id = orchestrator
            .create_challenge(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "+10000000000".into())
            .await
            .unwrap();

        let code = orchestrator.dev_peek(challenge_id).unwrap();
        let challenge = orchestrator.verify(challenge_id, &code).await.unwrap();
        assert_eq!(challenge.id, challenge_id);

        // single-use: a second verify attempt fails
        assert!(matches!(
            orchestrator.verify(challenge_id, &code).await,
            Err(MfaError::NotFound)
        ));
    }

    #[tokio::test]
    async fn wrong_otp_is_mismatch_and_preserves_challenge() {
        let orchestrator = orchestrator(true);
        let challenge_id = orchestrator
            .create_challenge(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "+10000000000".into())
            .await
            .unwrap();

        let code = orchestrator.dev_peek(challenge_id).unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        assert!(matches!(
            orchestrator.verify(challenge_id, wrong).await,
            Err(MfaError::Mismatch)
        ));
    }

    #[tokio::test]
    async fn dev_peek_disabled_in_production_mode() {
        let orchestrator = orchestrator(false);
        let challenge_id = orchestrator
            .create_challenge(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "+10000000000".into())
            .await
            .unwrap();
        assert!(orchestrator.dev_peek(challenge_id).is_none());
    }
}
