//! Identity service (C7): the register/login/MFA/refresh/logout state
//! machine. Composes the credential hasher, token provider, policy
//! engine, device-trust evaluator, and MFA orchestrator over the
//! repository contracts.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crypto::password::{CredentialHasher, PasswordError, validate_password_policy};
use crate::crypto::token::{Claims, TokenError, TokenProvider};
use crate::domain::audit::{AuditLog, AuthEventKind};
use crate::domain::device::Device;
use crate::domain::identity::Identity;
use crate::domain::mfa::mask_phone;
use crate::domain::policy::PlatformSettings;
use crate::domain::session::Session;
use crate::domain::user::User;
use crate::error::{DomainError, ErrorKind};
use crate::mfa::{MfaError, MfaOrchestrator};
use crate::policy::PolicyEngine;
use crate::repositories::Repositories;
use crate::value_objects::device_fingerprint::DeviceFingerprint;
use crate::value_objects::email::{Email, EmailError};
use crate::value_objects::revocation_reason::RevocationReason;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    Invalid,
    #[error("a user with this email already exists")]
    AlreadyExists,
    #[error("password does not meet policy requirements")]
    WeakPassword,
    #[error("session or challenge not found")]
    NotFound,
    #[error("session or challenge expired")]
    Expired,
    #[error(transparent)]
    Mfa(#[from] MfaError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl DomainError for IdentityError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid => ErrorKind::Invalid,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::WeakPassword => ErrorKind::Validation,
            Self::NotFound => ErrorKind::NotFound,
            Self::Expired => ErrorKind::Expired,
            Self::Mfa(inner) => inner.kind(),
            Self::Token(inner) => inner.kind(),
            Self::Password(inner) => inner.kind(),
            Self::Email(inner) => inner.kind(),
            Self::Repository(_) => ErrorKind::Internal,
        }
    }
}

pub struct TokenBundle {
    pub access_token: String,
    pub access_expires_at: chrono::DateTime<Utc>,
    pub refresh_token: String,
    pub session_id: Uuid,
}

pub enum LoginOutcome {
    Tokens(TokenBundle),
    PhoneRequired { intent_id: Uuid },
    MfaChallenge { challenge_id: Uuid, phone_masked: String },
}

pub struct IdentityService {
    repos: Repositories,
    hasher: Arc<CredentialHasher>,
    tokens: Arc<TokenProvider>,
    policy: Arc<PolicyEngine>,
    mfa: Arc<MfaOrchestrator>,
    platform: PlatformSettings,
}

impl IdentityService {
    pub fn new(
        repos: Repositories,
        hasher: Arc<CredentialHasher>,
        tokens: Arc<TokenProvider>,
        policy: Arc<PolicyEngine>,
        mfa: Arc<MfaOrchestrator>,
        platform: PlatformSettings,
    ) -> Self {
        Self {
            repos,
            hasher,
            tokens,
            policy,
            mfa,
            platform,
        }
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<Uuid, IdentityError> {
        let email = Email::parse(email)?;
        if self.repos.users.find_by_email(&email).await?.is_some() {
            return Err(IdentityError::AlreadyExists);
        }
        validate_password_policy(password).map_err(|_| IdentityError::WeakPassword)?;

        let user = User::new(Uuid::new_v4(), email, name);
        let digest = self.hasher.hash(password)?;
        let identity = Identity::local(user.id, digest);

        self.repos.users.save(&user).await?;
        self.repos.identities.save(&identity).await?;
        self.record(AuthEventKind::UserRegister, None, Some(user.id), None, None)
            .await;

        Ok(user.id)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        org_id: Uuid,
        device_fingerprint: Option<String>,
        client_ip: Option<String>,
    ) -> Result<LoginOutcome, IdentityError> {
        let email = Email::parse(email).map_err(|_| IdentityError::Invalid)?;
        let user = self
            .repos
            .users
            .find_by_email(&email)
            .await?
            .ok_or(IdentityError::Invalid)?;
        let identity = self
            .repos
            .identities
            .find_local_by_user(user.id)
            .await?
            .ok_or(IdentityError::Invalid)?;
        self.repos
            .memberships
            .find(user.id, org_id)
            .await?
            .ok_or(IdentityError::Invalid)?;

        let digest = identity.password_hash.as_deref().ok_or(IdentityError::Invalid)?;
        if !self.hasher.verify(password, digest)? {
            self.record(
                AuthEventKind::LoginFailed,
                Some(org_id),
                Some(user.id),
                client_ip.clone(),
                None,
            )
            .await;
            return Err(IdentityError::Invalid);
        }

        let fingerprint = device_fingerprint
            .ok_or(IdentityError::Invalid)
            .and_then(|fp| DeviceFingerprint::new(fp).map_err(|_| IdentityError::Invalid))?;

        let (device, is_new_device) = self.upsert_device(user.id, org_id, fingerprint).await?;

        let decision = self.decide(&user, org_id, Some(&device), is_new_device).await?;

        if decision.mfa_required {
            if !user.phone_verified || user.phone.is_none() {
                let intent = crate::domain::mfa::MfaIntent {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    org_id,
                    device_id: device.id,
                    expires_at: Utc::now() + Duration::minutes(10),
                };
                self.repos.mfa_intents.save(&intent).await?;
                self.record(
                    AuthEventKind::LoginMfaPhoneRequired,
                    Some(org_id),
                    Some(user.id),
                    client_ip,
                    None,
                )
                .await;
                return Ok(LoginOutcome::PhoneRequired {
                    intent_id: intent.id,
                });
            }

            let phone = user.phone.clone().expect("checked above");
            let challenge_id = self
                .mfa
                .create_challenge(user.id, org_id, device.id, phone.clone())
                .await?;
            self.record(
                AuthEventKind::LoginMfaChallenged,
                Some(org_id),
                Some(user.id),
                client_ip,
                None,
            )
            .await;
            return Ok(LoginOutcome::MfaChallenge {
                challenge_id,
                phone_masked: mask_phone(&phone),
            });
        }

        let bundle = self
            .issue_session(user.id, org_id, device.id, client_ip.clone())
            .await?;
        self.record(
            AuthEventKind::LoginSuccess,
            Some(org_id),
            Some(user.id),
            client_ip.clone(),
            None,
        )
        .await;
        self.record(
            AuthEventKind::SessionCreated,
            Some(org_id),
            Some(user.id),
            client_ip,
            Some(json!({ "session_id": bundle.session_id })),
        )
        .await;
        Ok(LoginOutcome::Tokens(bundle))
    }

    pub async fn submit_phone_and_request_mfa(
        &self,
        intent_id: Uuid,
        phone: String,
    ) -> Result<(Uuid, String), IdentityError> {
        let intent = self
            .repos
            .mfa_intents
            .find_by_id(intent_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        // One-shot: delete regardless of outcome.
        self.repos.mfa_intents.delete(intent_id).await?;

        if intent.is_expired(Utc::now()) {
            return Err(IdentityError::Expired);
        }

        let mut user = self
            .repos
            .users
            .find_by_id(intent.user_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        if user.can_set_phone() {
            user.phone = Some(phone.clone());
            self.repos.users.save(&user).await?;
        }

        let challenge_id = self
            .mfa
            .create_challenge(intent.user_id, intent.org_id, intent.device_id, phone.clone())
            .await?;
        Ok((challenge_id, mask_phone(&phone)))
    }

    pub async fn verify_mfa(
        &self,
        challenge_id: Uuid,
        otp: &str,
        client_ip: Option<String>,
    ) -> Result<TokenBundle, IdentityError> {
        let challenge = self.mfa.verify(challenge_id, otp).await?;

        let mut user = self
            .repos
            .users
            .find_by_id(challenge.user_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        let mut device = self
            .repos
            .devices
            .find_by_id(challenge.device_id)
            .await?
            .ok_or(IdentityError::NotFound)?;

        let decision = self
            .decide(&user, challenge.org_id, Some(&device), false)
            .await?;

        let now = Utc::now();
        if decision.register_trust_after_mfa && device.revoked_at.is_none() {
            device.register_trust(decision.trust_ttl_days, now);
            self.repos.devices.save(&device).await?;
        }
        if !user.phone_verified {
            user.phone_verified = true;
            self.repos.users.save(&user).await?;
        }

        let bundle = self
            .issue_session(user.id, challenge.org_id, device.id, client_ip.clone())
            .await?;
        self.record(
            AuthEventKind::MfaSuccess,
            Some(challenge.org_id),
            Some(user.id),
            client_ip.clone(),
            None,
        )
        .await;
        self.record(
            AuthEventKind::SessionCreated,
            Some(challenge.org_id),
            Some(user.id),
            client_ip,
            Some(json!({ "session_id": bundle.session_id })),
        )
        .await;
        Ok(bundle)
    }

    /// Refresh with reuse detection (§4.7, §9 open question (a) resolved
    /// as cascade): a presented token whose session is dead or whose
    /// hash no longer matches is treated as compromise.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device_fingerprint: Option<String>,
        client_ip: Option<String>,
    ) -> Result<RefreshOutcome, IdentityError> {
        let (jti, secret) = parse_refresh(refresh_token).ok_or(IdentityError::Invalid)?;
        let mut session = self
            .repos
            .sessions
            .find_by_refresh_jti(jti)
            .await?
            .ok_or(IdentityError::Invalid)?;

        let stored_hash = session.refresh_token_hash.clone().unwrap_or_default();
        if !session.is_active(Utc::now()) || !self.tokens.verify_refresh(secret, &stored_hash) {
            self.repos
                .sessions
                .revoke_all_for_user(
                    session.user_id,
                    session.org_id,
                    Utc::now(),
                    RevocationReason::ReuseDetected,
                )
                .await?;
            self.record(
                AuthEventKind::RefreshReuse,
                Some(session.org_id),
                Some(session.user_id),
                client_ip,
                None,
            )
            .await;
            return Err(IdentityError::Invalid);
        }

        let user = self
            .repos
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(IdentityError::NotFound)?;
        let device = self
            .repos
            .devices
            .find_by_id(session.device_id)
            .await?
            .ok_or(IdentityError::NotFound)?;

        if let Some(fp) = device_fingerprint {
            let fp = DeviceFingerprint::new(fp).map_err(|_| IdentityError::Invalid)?;
            if fp != device.fingerprint {
                warn!(session_id = %session.id, "refresh presented with mismatched device fingerprint");
            }
        }

        let decision = self.decide(&user, session.org_id, Some(&device), false).await?;
        if decision.mfa_required {
            let phone = user.phone.clone().unwrap_or_default();
            let challenge_id = self
                .mfa
                .create_challenge(user.id, session.org_id, device.id, phone.clone())
                .await?;
            return Ok(RefreshOutcome::MfaChallenge {
                challenge_id,
                phone_masked: mask_phone(&phone),
            });
        }

        let access = self.tokens.issue_access(user.id, session.org_id, session.id)?;
        let rotated = match (session.refresh_family_id, session.refresh_generation) {
            (Some(family_id), Some(generation)) => {
                self.tokens.rotate_refresh(family_id, generation as u32)?
            }
            _ => self.tokens.issue_refresh()?,
        };
        let new_jti = Uuid::new_v4();
        session.bind_refresh(
            new_jti,
            rotated.hash.clone(),
            rotated.token.family_id(),
            rotated.token.generation(),
        );
        session.touch(Utc::now());
        self.repos.sessions.save(&session).await?;

        self.record(
            AuthEventKind::RefreshSuccess,
            Some(session.org_id),
            Some(user.id),
            client_ip,
            None,
        )
        .await;

        Ok(RefreshOutcome::Tokens(TokenBundle {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: format_refresh(new_jti, rotated.token.value()),
            session_id: session.id,
        }))
    }

    pub async fn logout(
        &self,
        access_token: Option<&str>,
        client_ip: Option<String>,
    ) -> Result<(), IdentityError> {
        let Some(token) = access_token else {
            return Ok(());
        };
        let Ok(claims) = self.tokens.verify_access(token) else {
            return Ok(());
        };
        if let Some(mut session) = self.repos.sessions.find_by_id(claims.session_id).await? {
            session.revoke(Utc::now(), RevocationReason::UserLogout);
            self.repos.sessions.save(&session).await?;
            self.record(
                AuthEventKind::Logout,
                Some(claims.org_id),
                Some(claims.sub),
                client_ip,
                None,
            )
            .await;
        }
        Ok(())
    }

    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Uuid, IdentityError> {
        let email = Email::parse(email).map_err(|_| IdentityError::Invalid)?;
        let user = self
            .repos
            .users
            .find_by_email(&email)
            .await?
            .ok_or(IdentityError::Invalid)?;
        let identity = self
            .repos
            .identities
            .find_local_by_user(user.id)
            .await?
            .ok_or(IdentityError::Invalid)?;
        let digest = identity.password_hash.as_deref().ok_or(IdentityError::Invalid)?;
        if self.hasher.verify(password, digest)? {
            Ok(user.id)
        } else {
            Err(IdentityError::Invalid)
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.tokens.verify_access(token)
    }

    async fn upsert_device(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        fingerprint: DeviceFingerprint,
    ) -> Result<(Device, bool), IdentityError> {
        match self
            .repos
            .devices
            .find_by_fingerprint(user_id, org_id, &fingerprint)
            .await?
        {
            Some(mut device) => {
                device.touch(Utc::now());
                self.repos.devices.save(&device).await?;
                Ok((device, false))
            }
            None => {
                let device = Device::new_untrusted(user_id, org_id, fingerprint);
                self.repos.devices.save(&device).await?;
                Ok((device, true))
            }
        }
    }

    async fn decide(
        &self,
        user: &User,
        org_id: Uuid,
        device: Option<&Device>,
        is_new_device: bool,
    ) -> Result<crate::domain::policy::MfaDecision, IdentityError> {
        let org_settings = match self.repos.org_settings.get_mfa_settings(org_id).await? {
            Some(settings) => settings,
            None => crate::domain::policy::OrgMfaSettings::defaults(org_id),
        };
        let platform = PlatformSettings {
            mfa_required_always: self.platform.mfa_required_always,
            default_trust_ttl_days: self.repos.org_settings.get_platform_default_trust_ttl_days().await?,
        };
        let enabled_policies = self.repos.policies.list_enabled_for_org(org_id).await?;

        Ok(self.policy.evaluate(
            &platform,
            &org_settings,
            device,
            user,
            is_new_device,
            &enabled_policies,
            Utc::now(),
        ))
    }

    async fn issue_session(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        device_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<TokenBundle, IdentityError> {
        let refresh = self.tokens.issue_refresh()?;
        let mut session = Session::new(
            user_id,
            org_id,
            device_id,
            refresh.token.expires_at(),
            ip_address,
        );
        let access = self.tokens.issue_access(user_id, org_id, session.id)?;
        let jti = Uuid::new_v4();
        session.bind_refresh(
            jti,
            refresh.hash.clone(),
            refresh.token.family_id(),
            refresh.token.generation(),
        );
        self.repos.sessions.save(&session).await?;

        Ok(TokenBundle {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: format_refresh(jti, refresh.token.value()),
            session_id: session.id,
        })
    }

    async fn record(
        &self,
        kind: AuthEventKind,
        org_id: Option<Uuid>,
        user_id: Option<Uuid>,
        ip: Option<String>,
        metadata: Option<serde_json::Value>,
    ) {
        let mut entry = AuditLog::auth_event(kind, org_id, user_id, ip);
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }
        if let Err(err) = self.repos.audit.record(vec![entry]).await {
            warn!(error = %err, event = kind.as_str(), "failed to persist audit event");
        } else {
            info!(event = kind.as_str(), "auth event recorded");
        }
    }
}

pub enum RefreshOutcome {
    Tokens(TokenBundle),
    MfaChallenge { challenge_id: Uuid, phone_masked: String },
}

/// Refresh tokens are handed to clients as `{refresh_jti}.{secret}` so a
/// presented token names its session's current refresh_jti directly;
/// `SessionRepository::find_by_refresh_jti` is the lookup this enables.
/// The secret half is still what gets hashed and compared.
fn format_refresh(jti: Uuid, secret: &str) -> String {
    format!("{jti}.{secret}")
}

fn parse_refresh(token: &str) -> Option<(Uuid, &str)> {
    let (id_part, secret) = token.split_once('.')?;
    let jti = Uuid::parse_str(id_part).ok()?;
    Some((jti, secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::password::HashCost;
    use crate::mfa::NoopOtpSender;
    use crate::repositories::memory::in_memory_repositories;

    fn test_keys() -> (Vec<u8>, Vec<u8>) {
        (
            include_bytes!("../testdata/ed25519_private.pem").to_vec(),
            include_bytes!("../testdata/ed25519_public.pem").to_vec(),
        )
    }

    async fn service() -> (IdentityService, Uuid) {
        let repos = in_memory_repositories();
        let org = crate::domain::organization::Organization::new("acme".to_string());
        repos.organizations.save(&org).await.unwrap();

        let (private, public) = test_keys();
        let tokens = TokenProvider::new(
            &private,
            &public,
            "warden",
            "warden-clients",
            Duration::minutes(15),
            Duration::hours(168),
        )
        .unwrap();

        let svc = IdentityService::new(
            repos.clone(),
            Arc::new(CredentialHasher::new(HashCost::default())),
            Arc::new(tokens),
            Arc::new(PolicyEngine::new()),
            Arc::new(MfaOrchestrator::new(
                repos.mfa_challenges.clone(),
                Arc::new(NoopOtpSender),
                true,
            )),
            PlatformSettings::default(),
        );

        let user_id = svc
            .register("dev@example.com", "Str0ngP@ssword123", None)
            .await
            .unwrap();
        repos
            .memberships
            .save(&crate::domain::membership::Membership::new(
                user_id,
                org.id,
                crate::domain::membership::Role::Owner,
            ))
            .await
            .unwrap();

        (svc, org.id)
    }

    #[tokio::test]
    async fn register_then_login_without_mfa_issues_tokens() {
        let (svc, org_id) = service().await;
        // an org with no policy rows and default settings still requires
        // mfa on a brand-new device, so trust the device first.
        let outcome = svc
            .login(
                "dev@example.com",
                "Str0ngP@ssword123",
                org_id,
                Some("device-1".to_string()),
                Some("127.0.0.1".to_string()),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::PhoneRequired { .. }));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid() {
        let (svc, org_id) = service().await;
        let result = svc
            .login("dev@example.com", "wrong-password", org_id, Some("d".into()), None)
            .await;
        assert!(matches!(result, Err(IdentityError::Invalid)));
    }

    #[tokio::test]
    async fn full_phone_then_mfa_then_refresh_cycle() {
        let (svc, org_id) = service().await;
        let outcome = svc
            .login(
                "dev@example.com",
                "Str0ngP@ssword123",
                org_id,
                Some("device-1".to_string()),
                None,
            )
            .await
            .unwrap();
        let LoginOutcome::PhoneRequired { intent_id } = outcome else {
            panic!("expected phone to be required on a new device");
        };

        let (challenge_id, masked) = svc
            .submit_phone_and_request_mfa(intent_id, "+10000000000".to_string())
            .await
            .unwrap();
        assert_eq!(masked, "+1********00");

        // the dev-mode OTP was parked; peek it through the orchestrator.
        let code = svc.mfa.dev_peek(challenge_id).unwrap();
        let bundle = svc.verify_mfa(challenge_id, &code, None).await.unwrap();

        let refreshed = svc.refresh(&bundle.refresh_token, Some("device-1".into()), None).await;
        assert!(matches!(refreshed, Ok(RefreshOutcome::Tokens(_)) | Ok(RefreshOutcome::MfaChallenge { .. })));

        // presenting the same (now-rotated-away) refresh token again is reuse.
        let reused = svc.refresh(&bundle.refresh_token, Some("device-1".into()), None).await;
        assert!(matches!(reused, Err(IdentityError::Invalid)));
    }

    #[tokio::test]
    async fn logout_revokes_the_session() {
        let (svc, org_id) = service().await;
        let outcome = svc
            .login(
                "dev@example.com",
                "Str0ngP@ssword123",
                org_id,
                Some("device-1".to_string()),
                None,
            )
            .await
            .unwrap();
        let LoginOutcome::PhoneRequired { intent_id } = outcome else {
            panic!("expected phone to be required on a new device");
        };
        let (challenge_id, _) = svc
            .submit_phone_and_request_mfa(intent_id, "+10000000000".to_string())
            .await
            .unwrap();
        let code = svc.mfa.dev_peek(challenge_id).unwrap();
        let bundle = svc.verify_mfa(challenge_id, &code, None).await.unwrap();

        let claims = svc.verify_access_token(&bundle.access_token).unwrap();
        svc.logout(Some(&bundle.access_token), None).await.unwrap();

        let session = svc.repos.sessions.find_by_id(claims.session_id).await.unwrap();
        assert!(session.unwrap().revoked_at.is_some());
    }
}
