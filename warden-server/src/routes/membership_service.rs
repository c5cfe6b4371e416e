//! `warden.MembershipService` — org-admin membership CRUD.

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::domain::membership::{would_leave_org_ownerless, Membership, Role};

use super::rbac::require_role;
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};
use crate::middleware::auth::AuthContext;

const ADMIN_ROLES: &[Role] = &[Role::Owner, Role::Admin];

#[derive(Deserialize)]
pub struct ListMembersRequest {
    pub org_id: Uuid,
}

#[derive(Serialize)]
pub struct ListMembersResponse {
    pub members: Vec<Membership>,
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<ListMembersRequest>,
) -> AppResult<Json<ListMembersResponse>> {
    // Any member of the org may list its membership roster.
    require_role(&state, req.org_id, context.user_id, &[Role::Owner, Role::Admin, Role::Member]).await?;
    let members = state.repos.memberships.list_for_org(req.org_id).await?;
    Ok(Json(ListMembersResponse { members }))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<Json<Membership>> {
    require_role(&state, req.org_id, context.user_id, ADMIN_ROLES).await?;

    if state
        .repos
        .memberships
        .find(req.user_id, req.org_id)
        .await?
        .is_some()
    {
        return Err(AppError::new(
            warden_core::ErrorKind::AlreadyExists,
            "user is already a member of this organization",
        ));
    }

    let membership = Membership::new(req.user_id, req.org_id, req.role);
    state.repos.memberships.save(&membership).await?;
    Ok(Json(membership))
}

#[derive(Deserialize)]
pub struct RemoveMemberRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<RemoveMemberRequest>,
) -> AppResult<Json<serde_json::Value>> {
    require_role(&state, req.org_id, context.user_id, ADMIN_ROLES).await?;

    let members = state.repos.memberships.list_for_org(req.org_id).await?;
    if would_leave_org_ownerless(&members, req.user_id) {
        return Err(AppError::validation(
            "cannot remove the organization's last owner",
        ));
    }

    state
        .repos
        .memberships
        .remove(req.user_id, req.org_id)
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<UpdateRoleRequest>,
) -> AppResult<Json<Membership>> {
    require_role(&state, req.org_id, context.user_id, ADMIN_ROLES).await?;

    let mut membership = state
        .repos
        .memberships
        .find(req.user_id, req.org_id)
        .await?
        .ok_or_else(|| AppError::not_found("membership not found"))?;

    if membership.role == Role::Owner && req.role != Role::Owner {
        let members = state.repos.memberships.list_for_org(req.org_id).await?;
        if would_leave_org_ownerless(&members, req.user_id) {
            return Err(AppError::validation(
                "cannot demote the organization's last owner",
            ));
        }
    }

    membership.role = req.role;
    state.repos.memberships.save(&membership).await?;
    Ok(Json(membership))
}
