//! In-handler role gate (§4.8). Unlike the legacy admin-only middleware
//! this repo otherwise imitates, role checks here run inside each handler
//! that needs them, against the caller's membership in the *org the
//! request names* — which may differ from the org on the caller's bearer
//! token once cross-org admin calls are in play.

use uuid::Uuid;
use warden_core::domain::membership::{Membership, Role};

use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;
use crate::infra::errors::AppError;

pub async fn require_role(
    state: &AppState,
    org_id: Uuid,
    user_id: Uuid,
    allowed: &[Role],
) -> AppResult<Membership> {
    let membership = state
        .repos
        .memberships
        .find(user_id, org_id)
        .await?
        .ok_or_else(|| AppError::forbidden("caller is not a member of this organization"))?;

    if !allowed.contains(&membership.role) {
        return Err(AppError::forbidden(
            "caller's role does not permit this action",
        ));
    }
    Ok(membership)
}
