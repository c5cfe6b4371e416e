//! Composition root. `build()` is the auth-enabled-vs-degraded boundary
//! from §9: which `Repositories` backend gets wired, and whether non-public
//! RPCs answer at all, is decided once here, not per-request.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use warden_core::crypto::password::{CredentialHasher, HashCost};
use warden_core::crypto::token::TokenProvider;
use warden_core::domain::policy::PlatformSettings;
use warden_core::identity_service::IdentityService;
use warden_core::mfa::{MfaOrchestrator, NoopOtpSender, OtpSender, ReqwestOtpSender};
use warden_core::policy::PolicyEngine;
use warden_core::repositories::memory::in_memory_repositories;
use warden_core::repositories::postgres::postgres_repositories;
use warden_core::repositories::Repositories;

use super::config::Config;

/// Everything a handler needs, cloned per request (every field is an
/// `Arc` or cheaply `Clone`-able).
#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub identity: Arc<IdentityService>,
    pub tokens: Arc<TokenProvider>,
    pub policy: Arc<PolicyEngine>,
    pub mfa: Arc<MfaOrchestrator>,
    pub config: Arc<Config>,
    /// `Some` only when `DATABASE_URL` was configured; used for the
    /// health-check store ping and nothing else (repository access goes
    /// through `repos`).
    pub pool: Option<sqlx::PgPool>,
    /// False when `DATABASE_URL` is unset: non-public RPCs answer 501
    /// instead of touching a store that doesn't exist.
    pub auth_enabled: bool,
}

impl AppState {
    pub async fn build(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let (repos, pool) = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await
                    .context("connecting to DATABASE_URL")?;
                (postgres_repositories(pool.clone()), Some(pool))
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set; running with in-memory repositories, \
                     non-public RPCs will answer 501"
                );
                (in_memory_repositories(), None)
            }
        };
        let auth_enabled = config.database_url.is_some();

        let hash_cost = HashCost::from_bcrypt_cost(config.bcrypt_cost)
            .context("BCRYPT_COST out of range")?;
        let hasher = Arc::new(CredentialHasher::new(hash_cost));

        let tokens = Arc::new(
            TokenProvider::new(
                &config.jwt_private_key_pem,
                &config.jwt_public_key_pem,
                config.jwt_issuer.clone(),
                config.jwt_audience.clone(),
                config.jwt_access_ttl,
                config.jwt_refresh_ttl,
            )
            .context("constructing token provider from JWT key material")?,
        );

        let policy = Arc::new(PolicyEngine::new());

        let sender: Arc<dyn OtpSender> = if config.sms.is_configured() {
            Arc::new(ReqwestOtpSender::new(
                config.sms.base_url.clone().unwrap_or_default(),
                config.sms.api_key.clone().unwrap_or_default(),
                config.sms.sender.clone().unwrap_or_default(),
            ))
        } else {
            Arc::new(NoopOtpSender)
        };
        let mfa = Arc::new(MfaOrchestrator::new(
            repos.mfa_challenges.clone(),
            sender,
            config.otp_return_to_client,
        ));

        let platform = PlatformSettings {
            mfa_required_always: config.policy.mfa_required_always,
            default_trust_ttl_days: if config.policy.default_trust_ttl_days > 0 {
                config.policy.default_trust_ttl_days
            } else {
                config.default_trust_ttl_days
            },
        };

        let identity = Arc::new(IdentityService::new(
            repos.clone(),
            hasher,
            tokens.clone(),
            policy.clone(),
            mfa.clone(),
            platform,
        ));

        Ok(Self {
            repos,
            identity,
            tokens,
            policy,
            mfa,
            config,
            pool,
            auth_enabled,
        })
    }

    /// In-memory build used by integration tests: no `DATABASE_URL`, a
    /// throwaway Ed25519 keypair, and `auth_enabled` forced on so the
    /// protected RPCs are exercised against `in_memory_repositories`
    /// instead of answering 501.
    #[cfg(feature = "test-support")]
    pub fn test_fixture() -> Self {
        let private_pem = include_bytes!("../../../warden-core/testdata/ed25519_private.pem");
        let public_pem = include_bytes!("../../../warden-core/testdata/ed25519_public.pem");

        let config = Arc::new(Config::test_fixture());
        let repos = in_memory_repositories();

        let hasher = Arc::new(CredentialHasher::new(HashCost::default()));
        let tokens = Arc::new(
            TokenProvider::new(
                private_pem,
                public_pem,
                config.jwt_issuer.clone(),
                config.jwt_audience.clone(),
                config.jwt_access_ttl,
                config.jwt_refresh_ttl,
            )
            .expect("test keypair is valid"),
        );
        let policy = Arc::new(PolicyEngine::new());
        let mfa = Arc::new(MfaOrchestrator::new(
            repos.mfa_challenges.clone(),
            Arc::new(NoopOtpSender),
            true,
        ));
        let platform = PlatformSettings {
            mfa_required_always: false,
            default_trust_ttl_days: 30,
        };
        let identity = Arc::new(IdentityService::new(
            repos.clone(),
            hasher,
            tokens.clone(),
            policy.clone(),
            mfa.clone(),
            platform,
        ));

        Self {
            repos,
            identity,
            tokens,
            policy,
            mfa,
            config,
            pool: None,
            auth_enabled: true,
        }
    }
}
