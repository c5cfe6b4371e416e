//! Audit interceptor (C9). Runs after the handler and derives `(action,
//! resource)` from the method path rather than requiring every handler to
//! report itself. A write failure here is logged, never surfaced to the
//! caller — the RPC already produced its own result.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use warden_core::domain::audit::{derive_action_resource, AuditLog};

use super::auth::AuthContext;
use crate::infra::app_state::AppState;
use crate::infra::client_ip::ClientIp;

// AuthService RPCs already write their own canonical auth.*/session.*
// entries via IdentityService::record(); the generic path-derived mapping
// has no verb for Login/Logout/etc. and would otherwise double-write.
const SKIPPED_SERVICES: &[&str] = &[
    "warden.HealthService",
    "warden.DevService",
    "warden.AuthService",
];

pub async fn record_audit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let context = request.extensions().get::<AuthContext>().copied();
    let ip = request.extensions().get::<ClientIp>().map(|ip| ip.0.clone());

    let response = next.run(request).await;

    let service = path
        .trim_start_matches('/')
        .split_once('/')
        .map(|(service, _)| service)
        .unwrap_or_default();
    if SKIPPED_SERVICES.contains(&service) {
        return response;
    }

    let (action, resource) = derive_action_resource(&path);
    let entry = AuditLog::new(
        context.map(|c| c.org_id),
        context.map(|c| c.user_id),
        action,
        resource,
        ip,
    );

    if state.auth_enabled {
        if let Err(err) = state.repos.audit.record(vec![entry]).await {
            tracing::warn!(error = %err, path, "failed to persist audit entry");
        }
    }

    response
}
