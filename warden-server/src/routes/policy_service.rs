//! `warden.PolicyService` — admin-facing structured policy config. Updates
//! are expected to project their auth-relevant sections into
//! `OrgMfaSettings` atomically; `OrgSettingsRepository::update_policy_config`
//! carries that guarantee on the repository side.

use axum::extract::{Extension, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use warden_core::domain::membership::Role;
use warden_core::domain::policy::{
    DeviceTrustConfigSection, NotificationsConfigSection, OrgMfaConfigSection, OrgMfaSettings,
    OrgPolicyConfig, OrgPolicyConfigSections, RulesConfigSection, SessionConfigSection,
};

use super::rbac::require_role;
use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;
use crate::middleware::auth::AuthContext;

const ADMIN_ROLES: &[Role] = &[Role::Owner, Role::Admin];

fn default_config(org_id: Uuid, platform_default_trust_ttl_days: i64) -> OrgPolicyConfig {
    let settings = OrgMfaSettings::defaults(org_id);
    OrgPolicyConfig {
        org_id,
        config: OrgPolicyConfigSections {
            mfa: OrgMfaConfigSection {
                required_for_new_device: settings.mfa_required_for_new_device,
                required_for_untrusted: settings.mfa_required_for_untrusted,
                required_always: settings.mfa_required_always,
            },
            device_trust: DeviceTrustConfigSection {
                register_trust_after_mfa: settings.register_trust_after_mfa,
                trust_ttl_days: if settings.trust_ttl_days > 0 {
                    settings.trust_ttl_days
                } else {
                    platform_default_trust_ttl_days
                },
            },
            session: SessionConfigSection::default(),
            rules: RulesConfigSection::default(),
            notifications: NotificationsConfigSection::default(),
        },
        updated_at: settings.updated_at,
    }
}

#[derive(Deserialize)]
pub struct GetOrgPolicyConfigRequest {
    pub org_id: Uuid,
}

pub async fn get_org_policy_config(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<GetOrgPolicyConfigRequest>,
) -> AppResult<Json<OrgPolicyConfig>> {
    require_role(&state, req.org_id, context.user_id, ADMIN_ROLES).await?;

    let config = match state.repos.org_settings.get_policy_config(req.org_id).await? {
        Some(config) => config,
        None => {
            let ttl = state
                .repos
                .org_settings
                .get_platform_default_trust_ttl_days()
                .await?;
            default_config(req.org_id, ttl)
        }
    };
    Ok(Json(config))
}

#[derive(Deserialize)]
pub struct UpdateOrgPolicyConfigRequest {
    pub org_id: Uuid,
    pub config: OrgPolicyConfigSections,
}

pub async fn update_org_policy_config(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<UpdateOrgPolicyConfigRequest>,
) -> AppResult<Json<OrgPolicyConfig>> {
    require_role(&state, req.org_id, context.user_id, ADMIN_ROLES).await?;

    let config = OrgPolicyConfig {
        org_id: req.org_id,
        config: req.config,
        updated_at: chrono::Utc::now(),
    };
    state.repos.org_settings.update_policy_config(&config).await?;
    Ok(Json(config))
}
