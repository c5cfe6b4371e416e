//! `warden.HealthService` — always answers 200; the body distinguishes
//! `SERVING` from `NOT_SERVING` so callers don't need to special-case
//! transport-level failures differently from "this process is unwell".

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::infra::app_state::AppState;

#[derive(Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

#[derive(Serialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    let policy_ok = state.policy.self_test().is_ok();

    let store_ok = match &state.pool {
        Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        None => true,
    };

    let status = if policy_ok && store_ok {
        ServingStatus::Serving
    } else {
        ServingStatus::NotServing
    };
    Json(HealthCheckResponse { status })
}
