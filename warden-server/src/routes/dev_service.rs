//! `warden.DevService` — dev-only OTP retrieval. Registered only when
//! `OTP_RETURN_TO_CLIENT` is enabled, which startup refuses to allow in
//! production (§6), so a production deployment never exposes this route.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::app_state::AppState;

#[derive(Deserialize)]
pub struct GetOtpRequest {
    pub challenge_id: Uuid,
}

#[derive(Serialize)]
pub struct GetOtpResponse {
    pub otp: Option<String>,
}

pub async fn get_otp(
    State(state): State<AppState>,
    Json(req): Json<GetOtpRequest>,
) -> Json<GetOtpResponse> {
    Json(GetOtpResponse {
        otp: state.mfa.dev_peek(req.challenge_id),
    })
}
