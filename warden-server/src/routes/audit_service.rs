//! `warden.AuditService` — read-only access to the append-only audit log.

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::domain::audit::AuditLog;
use warden_core::domain::membership::Role;

use super::rbac::require_role;
use crate::infra::app_state::AppState;
use crate::infra::errors::AppResult;
use crate::middleware::auth::AuthContext;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Deserialize)]
pub struct ListAuditLogsRequest {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub page: u32,
    pub page_size: Option<u32>,
}

#[derive(Serialize)]
pub struct ListAuditLogsResponse {
    pub entries: Vec<AuditLog>,
    pub page: u32,
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    Json(req): Json<ListAuditLogsRequest>,
) -> AppResult<Json<ListAuditLogsResponse>> {
    require_role(&state, req.org_id, context.user_id, &[Role::Owner, Role::Admin]).await?;

    let page_size = req.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200);
    let entries = state
        .repos
        .audit
        .list_for_org(req.org_id, req.user_id, req.page, page_size)
        .await?;
    Ok(Json(ListAuditLogsResponse {
        entries,
        page: req.page,
    }))
}
