//! Route assembly. Every RPC gets a literal `/warden.<Service>/<Method>`
//! POST path rather than a RESTful resource hierarchy, so the interceptor
//! chain can derive `(action, resource)` straight from the path (C9) and
//! match against the public allowlist (C8) without a side table.

pub mod audit_service;
pub mod auth_service;
pub mod dev_service;
pub mod health_service;
pub mod membership_service;
pub mod policy_service;
pub mod rbac;
pub mod session_service;

use axum::routing::post;
use axum::Router;

use crate::infra::app_state::AppState;
use crate::infra::client_ip::resolve_client_ip;
use crate::middleware::{audit::record_audit, auth::require_auth};

pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/warden.AuthService/Register", post(auth_service::register))
        .route("/warden.AuthService/Login", post(auth_service::login))
        .route(
            "/warden.AuthService/SubmitPhoneAndRequestMFA",
            post(auth_service::submit_phone_and_request_mfa),
        )
        .route("/warden.AuthService/VerifyMFA", post(auth_service::verify_mfa))
        .route("/warden.AuthService/Refresh", post(auth_service::refresh))
        .route("/warden.AuthService/Logout", post(auth_service::logout))
        .route(
            "/warden.AuthService/VerifyCredentials",
            post(auth_service::verify_credentials),
        )
        .route(
            "/warden.SessionService/ListSessions",
            post(session_service::list_sessions),
        )
        .route(
            "/warden.SessionService/RevokeSession",
            post(session_service::revoke_session),
        )
        .route(
            "/warden.SessionService/RevokeAllSessionsForUser",
            post(session_service::revoke_all_sessions_for_user),
        )
        .route(
            "/warden.MembershipService/ListMembers",
            post(membership_service::list_members),
        )
        .route(
            "/warden.MembershipService/AddMember",
            post(membership_service::add_member),
        )
        .route(
            "/warden.MembershipService/RemoveMember",
            post(membership_service::remove_member),
        )
        .route(
            "/warden.MembershipService/UpdateRole",
            post(membership_service::update_role),
        )
        .route(
            "/warden.AuditService/ListAuditLogs",
            post(audit_service::list_audit_logs),
        )
        .route(
            "/warden.PolicyService/GetOrgPolicyConfig",
            post(policy_service::get_org_policy_config),
        )
        .route(
            "/warden.PolicyService/UpdateOrgPolicyConfig",
            post(policy_service::update_org_policy_config),
        )
        .route("/warden.HealthService/HealthCheck", post(health_service::health_check));

    if state.config.otp_return_to_client {
        router = router.route("/warden.DevService/GetOTP", post(dev_service::get_otp));
    }

    // route_layer applies only to routes registered above it, in the order
    // added; the last one applied wraps outermost. Innermost to outermost:
    // audit (needs the context require_auth just set) -> require_auth ->
    // client-ip resolution, all inside the state.
    router
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), record_audit))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::require_store,
        ))
        .route_layer(axum::middleware::from_fn(resolve_client_ip))
        .with_state(state)
}
