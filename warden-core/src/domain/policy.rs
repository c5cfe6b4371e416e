use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A declarative rule set attached to an org. Zero or more may be
/// enabled at once; all enabled texts are compiled together per
/// evaluation by the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub org_id: Uuid,
    pub rules: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// At most one per org. Defaults mirror the engine's fallback truth
/// table in §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMfaSettings {
    pub org_id: Uuid,
    pub mfa_required_for_new_device: bool,
    pub mfa_required_for_untrusted: bool,
    pub mfa_required_always: bool,
    pub register_trust_after_mfa: bool,
    pub trust_ttl_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrgMfaSettings {
    pub fn defaults(org_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            org_id,
            mfa_required_for_new_device: true,
            mfa_required_for_untrusted: true,
            mfa_required_always: false,
            register_trust_after_mfa: true,
            trust_ttl_days: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Process-wide tunables, e.g. `default_trust_ttl_days`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub mfa_required_always: bool,
    pub default_trust_ttl_days: i64,
}

/// The admin-facing structured view. On update, the auth-relevant
/// sections project back into `OrgMfaSettings` in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgPolicyConfig {
    pub org_id: Uuid,
    pub config: OrgPolicyConfigSections,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgPolicyConfigSections {
    pub mfa: OrgMfaConfigSection,
    pub device_trust: DeviceTrustConfigSection,
    pub session: SessionConfigSection,
    pub rules: RulesConfigSection,
    pub notifications: NotificationsConfigSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMfaConfigSection {
    pub required_for_new_device: bool,
    pub required_for_untrusted: bool,
    pub required_always: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTrustConfigSection {
    pub register_trust_after_mfa: bool,
    pub trust_ttl_days: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfigSection {
    pub concurrent_session_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfigSection {
    pub enabled_policy_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfigSection {
    pub notify_on_new_device: bool,
}

impl OrgPolicyConfig {
    /// Projects the auth-relevant sections into `OrgMfaSettings`,
    /// leaving `session`/`rules`/`notifications` as admin-only concerns.
    pub fn project_mfa_settings(&self) -> OrgMfaSettings {
        let now = Utc::now();
        OrgMfaSettings {
            org_id: self.org_id,
            mfa_required_for_new_device: self.config.mfa.required_for_new_device,
            mfa_required_for_untrusted: self.config.mfa.required_for_untrusted,
            mfa_required_always: self.config.mfa.required_always,
            register_trust_after_mfa: self.config.device_trust.register_trust_after_mfa,
            trust_ttl_days: self.config.device_trust.trust_ttl_days,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Output of a policy evaluation (C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaDecision {
    pub mfa_required: bool,
    pub register_trust_after_mfa: bool,
    pub trust_ttl_days: i64,
}
