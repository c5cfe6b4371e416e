use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Append-only audit row (§3). Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: String,
    pub ip: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Canonical names for the explicit auth/session lifecycle events C7
/// emits directly, bypassing the method-path derivation in C9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    UserRegister,
    LoginSuccess,
    LoginFailed,
    LoginMfaPhoneRequired,
    LoginMfaChallenged,
    MfaSuccess,
    RefreshSuccess,
    RefreshReuse,
    Logout,
    SessionCreated,
    SessionRevoked,
}

impl AuthEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRegister => "user.register",
            Self::LoginSuccess => "auth.login_success",
            Self::LoginFailed => "auth.login_failed",
            Self::LoginMfaPhoneRequired => "auth.login_mfa_phone_required",
            Self::LoginMfaChallenged => "auth.login_mfa_challenged",
            Self::MfaSuccess => "auth.mfa_success",
            Self::RefreshSuccess => "auth.refresh_success",
            Self::RefreshReuse => "auth.refresh_reuse",
            Self::Logout => "auth.logout",
            Self::SessionCreated => "session.created",
            Self::SessionRevoked => "session.revoked",
        }
    }
}

impl AuditLog {
    pub fn new(
        org_id: Option<Uuid>,
        user_id: Option<Uuid>,
        action: impl Into<String>,
        resource: impl Into<String>,
        ip: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            action: action.into(),
            resource: resource.into(),
            ip,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn auth_event(
        kind: AuthEventKind,
        org_id: Option<Uuid>,
        user_id: Option<Uuid>,
        ip: Option<String>,
    ) -> Self {
        Self::new(org_id, user_id, kind.as_str(), "session", ip)
    }
}

/// `(action, resource)` derivation from a full method path
/// (C9, §4.9): `/pkg.Service/Method`.
pub fn derive_action_resource(full_method: &str) -> (String, String) {
    let trimmed = full_method.trim_start_matches('/');
    let Some((service, method)) = trimmed.split_once('/') else {
        return (trimmed.to_lowercase(), "unknown".to_string());
    };

    // service looks like "warden.SessionService" -> resource "session"
    let service_name = service.rsplit('.').next().unwrap_or(service);
    let resource = service_name
        .strip_suffix("Service")
        .unwrap_or(service_name)
        .to_lowercase();

    match method {
        "AddMember" => return ("user_added".to_string(), "user".to_string()),
        "RemoveMember" => return ("user_removed".to_string(), "user".to_string()),
        "UpdateRole" => return ("role_changed".to_string(), "user".to_string()),
        _ => {}
    }

    let action = [
        ("Get", "get"),
        ("List", "list"),
        ("Create", "create"),
        ("Update", "update"),
        ("Delete", "delete"),
        ("Revoke", "revoke"),
        ("Register", "register"),
        ("Suspend", "suspend"),
    ]
    .iter()
    .find_map(|(prefix, verb)| method.starts_with(prefix).then_some(*verb));

    match action {
        Some(verb) => (verb.to_string(), resource),
        None => (method.to_lowercase(), "unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_well_known_verbs() {
        assert_eq!(
            derive_action_resource("/warden.SessionService/ListSessions"),
            ("list".to_string(), "session".to_string())
        );
        assert_eq!(
            derive_action_resource("/warden.SessionService/RevokeSession"),
            ("revoke".to_string(), "session".to_string())
        );
        assert_eq!(
            derive_action_resource("/warden.PolicyService/UpdateOrgPolicyConfig"),
            ("update".to_string(), "policy".to_string())
        );
    }

    #[test]
    fn derives_special_membership_cases() {
        assert_eq!(
            derive_action_resource("/warden.MembershipService/AddMember"),
            ("user_added".to_string(), "user".to_string())
        );
        assert_eq!(
            derive_action_resource("/warden.MembershipService/RemoveMember"),
            ("user_removed".to_string(), "user".to_string())
        );
        assert_eq!(
            derive_action_resource("/warden.MembershipService/UpdateRole"),
            ("role_changed".to_string(), "user".to_string())
        );
    }

    #[test]
    fn unknown_method_falls_back_to_lowercased_name() {
        assert_eq!(
            derive_action_resource("/warden.HealthService/HealthCheck"),
            ("healthcheck".to_string(), "unknown".to_string())
        );
    }

    #[test]
    fn malformed_path_is_handled_without_panicking() {
        let (action, resource) = derive_action_resource("not-a-path");
        assert_eq!(resource, "unknown");
        assert_eq!(action, "not-a-path");
    }
}
