//! `warden.AuthService` — the only service most of whose methods are on
//! the public allowlist (registration and login have to be reachable
//! before a caller holds a token at all).

use axum::extract::{Extension, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::identity_service::{LoginOutcome, RefreshOutcome, TokenBundle};

use crate::infra::app_state::AppState;
use crate::infra::client_ip::ClientIp;
use crate::infra::errors::AppResult;
use crate::middleware::auth::AuthContext;

fn ip_of(ip: Option<Extension<ClientIp>>) -> Option<String> {
    ip.map(|Extension(ClientIp(ip))| ip)
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let user_id = state
        .identity
        .register(&req.email, &req.password, req.name)
        .await?;
    Ok(Json(RegisterResponse { user_id }))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub org_id: Uuid,
    pub device_fingerprint: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LoginResponse {
    Tokens {
        access_token: String,
        access_expires_at: DateTime<Utc>,
        refresh_token: String,
        session_id: Uuid,
    },
    PhoneRequired {
        intent_id: Uuid,
    },
    MfaChallenge {
        challenge_id: Uuid,
        phone_masked: String,
    },
}

impl From<TokenBundle> for LoginResponse {
    fn from(bundle: TokenBundle) -> Self {
        LoginResponse::Tokens {
            access_token: bundle.access_token,
            access_expires_at: bundle.access_expires_at,
            refresh_token: bundle.refresh_token,
            session_id: bundle.session_id,
        }
    }
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Tokens(bundle) => bundle.into(),
            LoginOutcome::PhoneRequired { intent_id } => LoginResponse::PhoneRequired { intent_id },
            LoginOutcome::MfaChallenge { challenge_id, phone_masked } => {
                LoginResponse::MfaChallenge { challenge_id, phone_masked }
            }
        }
    }
}

impl From<RefreshOutcome> for LoginResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Tokens(bundle) => bundle.into(),
            RefreshOutcome::MfaChallenge { challenge_id, phone_masked } => {
                LoginResponse::MfaChallenge { challenge_id, phone_masked }
            }
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = state
        .identity
        .login(&req.email, &req.password, req.org_id, req.device_fingerprint, ip_of(ip))
        .await?;
    Ok(Json(outcome.into()))
}

#[derive(Deserialize)]
pub struct SubmitPhoneRequest {
    pub intent_id: Uuid,
    pub phone: String,
}

#[derive(Serialize)]
pub struct SubmitPhoneResponse {
    pub challenge_id: Uuid,
    pub phone_masked: String,
}

pub async fn submit_phone_and_request_mfa(
    State(state): State<AppState>,
    Json(req): Json<SubmitPhoneRequest>,
) -> AppResult<Json<SubmitPhoneResponse>> {
    let (challenge_id, phone_masked) = state
        .identity
        .submit_phone_and_request_mfa(req.intent_id, req.phone)
        .await?;
    Ok(Json(SubmitPhoneResponse { challenge_id, phone_masked }))
}

#[derive(Deserialize)]
pub struct VerifyMfaRequest {
    pub challenge_id: Uuid,
    pub otp: String,
}

pub async fn verify_mfa(
    State(state): State<AppState>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<VerifyMfaRequest>,
) -> AppResult<Json<LoginResponse>> {
    let bundle = state
        .identity
        .verify_mfa(req.challenge_id, &req.otp, ip_of(ip))
        .await?;
    Ok(Json(bundle.into()))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub device_fingerprint: Option<String>,
}

pub async fn refresh(
    State(state): State<AppState>,
    ip: Option<Extension<ClientIp>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = state
        .identity
        .refresh(&req.refresh_token, req.device_fingerprint, ip_of(ip))
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn logout(
    State(state): State<AppState>,
    ip: Option<Extension<ClientIp>>,
    context: Option<Extension<AuthContext>>,
    headers: axum::http::HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let _ = context;
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    state.identity.logout(token, ip_of(ip)).await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
pub struct VerifyCredentialsRequest {
    pub email: String,
    pub password: String,
}

pub async fn verify_credentials(
    State(state): State<AppState>,
    Json(req): Json<VerifyCredentialsRequest>,
) -> AppResult<Json<RegisterResponse>> {
    let user_id = state
        .identity
        .verify_credentials(&req.email, &req.password)
        .await?;
    Ok(Json(RegisterResponse { user_id }))
}
