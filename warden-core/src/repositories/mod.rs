//! Repository contracts (C3): pure async interfaces over the entities in
//! the data model. Absent rows are `Option::None`, never an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::audit::AuditLog;
use crate::domain::device::Device;
use crate::domain::identity::Identity;
use crate::domain::membership::Membership;
use crate::domain::mfa::{MfaChallenge, MfaIntent};
use crate::domain::organization::Organization;
use crate::domain::policy::{OrgMfaSettings, OrgPolicyConfig, Policy};
use crate::domain::session::Session;
use crate::domain::user::User;
use crate::value_objects::device_fingerprint::DeviceFingerprint;
use crate::value_objects::email::Email;
use crate::value_objects::revocation_reason::RevocationReason;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &Email) -> anyhow::Result<Option<User>>;
    async fn save(&self, user: &User) -> anyhow::Result<()>;
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_local_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>>;
    async fn save(&self, identity: &Identity) -> anyhow::Result<()>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Organization>>;
    async fn save(&self, org: &Organization) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<Option<Membership>>;
    async fn list_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Membership>>;
    async fn save(&self, membership: &Membership) -> anyhow::Result<()>;
    async fn remove(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Device>>;
    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        fingerprint: &DeviceFingerprint,
    ) -> anyhow::Result<Option<Device>>;
    async fn save(&self, device: &Device) -> anyhow::Result<()>;
}

/// What a refresh-bound session looks like to the reuse-detection path:
/// the hash currently live for `refresh_jti`, plus enough of the session
/// to decide whether the presented secret is reuse or a live rotation.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Session>>;
    async fn find_by_refresh_jti(&self, jti: Uuid) -> anyhow::Result<Option<Session>>;
    async fn save(&self, session: &Session) -> anyhow::Result<()>;
    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> anyhow::Result<Vec<Session>>;
    async fn list_for_org(&self, org_id: Uuid, user_id: Option<Uuid>) -> anyhow::Result<Vec<Session>>;
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        now: DateTime<Utc>,
        reason: RevocationReason,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MfaChallengeRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaChallenge>>;
    async fn save(&self, challenge: &MfaChallenge) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MfaIntentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaIntent>>;
    async fn save(&self, intent: &MfaIntent) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn list_enabled_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Policy>>;
    async fn save(&self, policy: &Policy) -> anyhow::Result<()>;
}

#[async_trait]
pub trait OrgSettingsRepository: Send + Sync {
    async fn get_mfa_settings(&self, org_id: Uuid) -> anyhow::Result<Option<OrgMfaSettings>>;
    async fn get_policy_config(&self, org_id: Uuid) -> anyhow::Result<Option<OrgPolicyConfig>>;
    /// Writes the config and its projected MFA settings atomically.
    async fn update_policy_config(&self, config: &OrgPolicyConfig) -> anyhow::Result<()>;
    async fn get_platform_default_trust_ttl_days(&self) -> anyhow::Result<i64>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, entries: Vec<AuditLog>) -> anyhow::Result<()>;
    async fn list_for_org(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<AuditLog>>;
}

/// Convenience bag so services and `AppState` can depend on one handle
/// instead of nine. Each field is independently substitutable (Postgres
/// vs. in-memory) for tests.
#[derive(Clone)]
pub struct Repositories {
    pub users: std::sync::Arc<dyn UserRepository>,
    pub identities: std::sync::Arc<dyn IdentityRepository>,
    pub organizations: std::sync::Arc<dyn OrganizationRepository>,
    pub memberships: std::sync::Arc<dyn MembershipRepository>,
    pub devices: std::sync::Arc<dyn DeviceRepository>,
    pub sessions: std::sync::Arc<dyn SessionRepository>,
    pub mfa_challenges: std::sync::Arc<dyn MfaChallengeRepository>,
    pub mfa_intents: std::sync::Arc<dyn MfaIntentRepository>,
    pub policies: std::sync::Arc<dyn PolicyRepository>,
    pub org_settings: std::sync::Arc<dyn OrgSettingsRepository>,
    pub audit: std::sync::Arc<dyn AuditRepository>,
}

/// Metadata never persisted directly is assembled by callers into
/// `serde_json::Value` before handing it to `AuditRepository::record`.
pub type AuditMetadata = Value;
