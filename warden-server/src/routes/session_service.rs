//! `warden.SessionService` — session listing/revocation for org admins
//! and for a member acting on their own sessions.

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::domain::membership::Role;
use warden_core::domain::session::Session;
use warden_core::value_objects::revocation_reason::RevocationReason;

use super::rbac::require_role;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};
use crate::middleware::auth::AuthContext;

#[derive(Deserialize)]
pub struct ListSessionsRequest {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
}

/// An admin lists any member's sessions; a non-admin may only list
/// their own (`user_id` must be absent or equal to the caller).
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<ListSessionsRequest>,
) -> AppResult<Json<ListSessionsResponse>> {
    let membership = state
        .repos
        .memberships
        .find(context.user_id, req.org_id)
        .await?
        .ok_or_else(|| AppError::forbidden("caller is not a member of this organization"))?;

    let target_user = match req.user_id {
        Some(uid) if uid != context.user_id && !membership.role.is_admin_or_above() => {
            return Err(AppError::forbidden("cannot list another member's sessions"));
        }
        Some(uid) => Some(uid),
        None => None,
    };

    let sessions = state
        .repos
        .sessions
        .list_for_org(req.org_id, target_user)
        .await?;
    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Deserialize)]
pub struct RevokeSessionRequest {
    pub session_id: Uuid,
}

pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<RevokeSessionRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let mut session = state
        .repos
        .sessions
        .find_by_id(req.session_id)
        .await?
        .ok_or_else(|| AppError::not_found("session not found"))?;

    let reason = if session.user_id != context.user_id {
        require_role(&state, session.org_id, context.user_id, &[Role::Owner, Role::Admin]).await?;
        RevocationReason::AdminPasswordReset
    } else {
        RevocationReason::UserLogout
    };

    session.revoke(chrono::Utc::now(), reason);
    state.repos.sessions.save(&session).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct RevokeAllSessionsForUserRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

pub async fn revoke_all_sessions_for_user(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<RevokeAllSessionsForUserRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let reason = if req.user_id != context.user_id {
        require_role(&state, req.org_id, context.user_id, &[Role::Owner, Role::Admin]).await?;
        RevocationReason::AdminPasswordReset
    } else {
        RevocationReason::UserLogout
    };
    state
        .repos
        .sessions
        .revoke_all_for_user(req.user_id, req.org_id, chrono::Utc::now(), reason)
        .await?;
    Ok(Json(serde_json::json!({})))
}
