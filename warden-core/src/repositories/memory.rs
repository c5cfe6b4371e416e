//! In-memory repository implementations backing service-level tests
//! without a database, per the ambient test-tooling conventions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
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

use super::{
    AuditRepository, DeviceRepository, IdentityRepository, MembershipRepository,
    MfaChallengeRepository, MfaIntentRepository, OrgSettingsRepository, OrganizationRepository,
    PolicyRepository, Repositories, SessionRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryUsers(DashMap<Uuid, User>);

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn find_by_email(&self, email: &Email) -> anyhow::Result<Option<User>> {
        Ok(self
            .0
            .iter()
            .find(|e| e.value().email == *email)
            .map(|e| e.value().clone()))
    }

    async fn save(&self, user: &User) -> anyhow::Result<()> {
        self.0.insert(user.id, user.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdentities(DashMap<Uuid, Identity>);

#[async_trait]
impl IdentityRepository for InMemoryIdentities {
    async fn find_local_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>> {
        Ok(self
            .0
            .iter()
            .find(|e| e.value().user_id == user_id)
            .map(|e| e.value().clone()))
    }

    async fn save(&self, identity: &Identity) -> anyhow::Result<()> {
        self.0.insert(identity.id, identity.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrganizations(DashMap<Uuid, Organization>);

#[async_trait]
impl OrganizationRepository for InMemoryOrganizations {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Organization>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn save(&self, org: &Organization) -> anyhow::Result<()> {
        self.0.insert(org.id, org.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMemberships(DashMap<(Uuid, Uuid), Membership>);

#[async_trait]
impl MembershipRepository for InMemoryMemberships {
    async fn find(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<Option<Membership>> {
        Ok(self.0.get(&(user_id, org_id)).map(|e| e.clone()))
    }

    async fn list_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Membership>> {
        Ok(self
            .0
            .iter()
            .filter(|e| e.value().org_id == org_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save(&self, membership: &Membership) -> anyhow::Result<()> {
        self.0
            .insert((membership.user_id, membership.org_id), membership.clone());
        Ok(())
    }

    async fn remove(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<()> {
        self.0.remove(&(user_id, org_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDevices(DashMap<Uuid, Device>);

#[async_trait]
impl DeviceRepository for InMemoryDevices {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Device>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        fingerprint: &DeviceFingerprint,
    ) -> anyhow::Result<Option<Device>> {
        Ok(self
            .0
            .iter()
            .find(|e| {
                let d = e.value();
                d.user_id == user_id && d.org_id == org_id && &d.fingerprint == fingerprint
            })
            .map(|e| e.value().clone()))
    }

    async fn save(&self, device: &Device) -> anyhow::Result<()> {
        self.0.insert(device.id, device.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessions(DashMap<Uuid, Session>);

#[async_trait]
impl SessionRepository for InMemorySessions {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn find_by_refresh_jti(&self, jti: Uuid) -> anyhow::Result<Option<Session>> {
        Ok(self
            .0
            .iter()
            .find(|e| e.value().refresh_jti == Some(jti))
            .map(|e| e.value().clone()))
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.0.insert(session.id, session.clone());
        Ok(())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> anyhow::Result<Vec<Session>> {
        let now = Utc::now();
        Ok(self
            .0
            .iter()
            .filter(|e| {
                let s = e.value();
                s.user_id == user_id && s.org_id == org_id && s.is_active(now)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn list_for_org(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Session>> {
        Ok(self
            .0
            .iter()
            .filter(|e| {
                let s = e.value();
                s.org_id == org_id && user_id.is_none_or(|u| s.user_id == u)
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        now: DateTime<Utc>,
        reason: RevocationReason,
    ) -> anyhow::Result<()> {
        for mut entry in self.0.iter_mut() {
            let session = entry.value_mut();
            if session.user_id == user_id && session.org_id == org_id {
                session.revoke(now, reason);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMfaChallenges(DashMap<Uuid, MfaChallenge>);

#[async_trait]
impl MfaChallengeRepository for InMemoryMfaChallenges {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaChallenge>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn save(&self, challenge: &MfaChallenge) -> anyhow::Result<()> {
        self.0.insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.0.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMfaIntents(DashMap<Uuid, MfaIntent>);

#[async_trait]
impl MfaIntentRepository for InMemoryMfaIntents {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaIntent>> {
        Ok(self.0.get(&id).map(|e| e.clone()))
    }

    async fn save(&self, intent: &MfaIntent) -> anyhow::Result<()> {
        self.0.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.0.remove(&id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPolicies(DashMap<Uuid, Policy>);

#[async_trait]
impl PolicyRepository for InMemoryPolicies {
    async fn list_enabled_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Policy>> {
        Ok(self
            .0
            .iter()
            .filter(|e| e.value().org_id == org_id && e.value().enabled)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn save(&self, policy: &Policy) -> anyhow::Result<()> {
        self.0.insert(policy.id, policy.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrgSettings {
    mfa: DashMap<Uuid, OrgMfaSettings>,
    config: DashMap<Uuid, OrgPolicyConfig>,
    default_trust_ttl_days: std::sync::atomic::AtomicI64,
}

impl InMemoryOrgSettings {
    pub fn with_default_trust_ttl_days(days: i64) -> Self {
        Self {
            mfa: DashMap::new(),
            config: DashMap::new(),
            default_trust_ttl_days: std::sync::atomic::AtomicI64::new(days),
        }
    }
}

#[async_trait]
impl OrgSettingsRepository for InMemoryOrgSettings {
    async fn get_mfa_settings(&self, org_id: Uuid) -> anyhow::Result<Option<OrgMfaSettings>> {
        Ok(self.mfa.get(&org_id).map(|e| e.clone()))
    }

    async fn get_policy_config(&self, org_id: Uuid) -> anyhow::Result<Option<OrgPolicyConfig>> {
        Ok(self.config.get(&org_id).map(|e| e.clone()))
    }

    async fn update_policy_config(&self, config: &OrgPolicyConfig) -> anyhow::Result<()> {
        self.mfa
            .insert(config.org_id, config.project_mfa_settings());
        self.config.insert(config.org_id, config.clone());
        Ok(())
    }

    async fn get_platform_default_trust_ttl_days(&self) -> anyhow::Result<i64> {
        Ok(self
            .default_trust_ttl_days
            .load(std::sync::atomic::Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct InMemoryAudit(DashMap<Uuid, AuditLog>);

#[async_trait]
impl AuditRepository for InMemoryAudit {
    async fn record(&self, entries: Vec<AuditLog>) -> anyhow::Result<()> {
        for entry in entries {
            self.0.insert(entry.id, entry);
        }
        Ok(())
    }

    async fn list_for_org(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<AuditLog>> {
        let mut rows: Vec<AuditLog> = self
            .0
            .iter()
            .filter(|e| {
                let log = e.value();
                log.org_id == Some(org_id) && user_id.is_none_or(|u| log.user_id == Some(u))
            })
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|r| r.created_at);
        let start = (page as usize) * (page_size as usize);
        Ok(rows.into_iter().skip(start).take(page_size as usize).collect())
    }
}

/// Builds a fully in-memory `Repositories` bag for tests.
pub fn in_memory_repositories() -> Repositories {
    Repositories {
        users: Arc::new(InMemoryUsers::default()),
        identities: Arc::new(InMemoryIdentities::default()),
        organizations: Arc::new(InMemoryOrganizations::default()),
        memberships: Arc::new(InMemoryMemberships::default()),
        devices: Arc::new(InMemoryDevices::default()),
        sessions: Arc::new(InMemorySessions::default()),
        mfa_challenges: Arc::new(InMemoryMfaChallenges::default()),
        mfa_intents: Arc::new(InMemoryMfaIntents::default()),
        policies: Arc::new(InMemoryPolicies::default()),
        org_settings: Arc::new(InMemoryOrgSettings::with_default_trust_ttl_days(30)),
        audit: Arc::new(InMemoryAudit::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_round_trips_by_email() {
        let repo = InMemoryUsers::default();
        let email = Email::parse("dev@example.com").unwrap();
        let user = User::new(Uuid::new_v4(), email.clone(), None);
        repo.save(&user).await.unwrap();
        let found = repo.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn session_reuse_cascade_revokes_all_user_sessions() {
        let repo = InMemorySessions::default();
        let user_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let s1 = Session::new(
            user_id,
            org_id,
            Uuid::new_v4(),
            Utc::now() + chrono::Duration::hours(1),
            None,
        );
        repo.save(&s1).await.unwrap();
        repo.revoke_all_for_user(user_id, org_id, Utc::now(), RevocationReason::ReuseDetected)
            .await
            .unwrap();
        let active = repo.list_active_for_user(user_id, org_id).await.unwrap();
        assert!(active.is_empty());
    }
}
