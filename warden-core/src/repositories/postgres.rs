//! Postgres-backed repository implementations. Queries are built with
//! `sqlx::query_as`/`query` at runtime rather than the `query!` macros:
//! the macros need a reachable `DATABASE_URL` (or a checked-in
//! `.sqlx` cache) at compile time, which this workspace does not assume.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::audit::AuditLog;
use crate::domain::device::Device;
use crate::domain::identity::{Identity, IdentityProvider};
use crate::domain::membership::{Membership, Role};
use crate::domain::mfa::{MfaChallenge, MfaIntent};
use crate::domain::organization::{Organization, OrganizationStatus};
use crate::domain::policy::{OrgMfaSettings, OrgPolicyConfig, Policy};
use crate::domain::session::Session;
use crate::domain::user::{User, UserStatus};
use crate::value_objects::device_fingerprint::DeviceFingerprint;
use crate::value_objects::email::Email;
use crate::value_objects::revocation_reason::RevocationReason;

use super::{
    AuditRepository, DeviceRepository, IdentityRepository, MembershipRepository,
    MfaChallengeRepository, MfaIntentRepository, OrgSettingsRepository, OrganizationRepository,
    PolicyRepository, SessionRepository, UserRepository,
};

pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: Option<String>,
    phone: Option<String>,
    phone_verified: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: Email::parse(&row.email)?,
            name: row.name,
            phone: row.phone,
            phone_verified: row.phone_verified,
            status: match row.status.as_str() {
                "active" => UserStatus::Active,
                _ => UserStatus::Disabled,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserRepository for PgUsers {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, phone, phone_verified, status, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> anyhow::Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, phone, phone_verified, status, created_at, updated_at
             FROM users WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn save(&self, user: &User) -> anyhow::Result<()> {
        let status = match user.status {
            UserStatus::Active => "active",
            UserStatus::Disabled => "disabled",
        };
        sqlx::query(
            "INSERT INTO users (id, email, name, phone, phone_verified, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                phone_verified = EXCLUDED.phone_verified,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(user.id)
        .bind(user.email.as_str())
        .bind(&user.name)
        .bind(&user.phone)
        .bind(user.phone_verified)
        .bind(status)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgIdentities {
    pool: PgPool,
}

impl PgIdentities {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    user_id: Uuid,
    provider: String,
    provider_id: String,
    password_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Identity {
            id: row.id,
            user_id: row.user_id,
            provider: match row.provider.as_str() {
                "oidc" => IdentityProvider::Oidc,
                "saml" => IdentityProvider::Saml,
                _ => IdentityProvider::Local,
            },
            provider_id: row.provider_id,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentities {
    async fn find_local_by_user(&self, user_id: Uuid) -> anyhow::Result<Option<Identity>> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, user_id, provider, provider_id, password_hash, created_at
             FROM identities WHERE user_id = $1 AND provider = 'local'",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    async fn save(&self, identity: &Identity) -> anyhow::Result<()> {
        let provider = match identity.provider {
            IdentityProvider::Local => "local",
            IdentityProvider::Oidc => "oidc",
            IdentityProvider::Saml => "saml",
        };
        sqlx::query(
            "INSERT INTO identities (id, user_id, provider, provider_id, password_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, provider, provider_id) DO UPDATE SET
                password_hash = EXCLUDED.password_hash",
        )
        .bind(identity.id)
        .bind(identity.user_id)
        .bind(provider)
        .bind(&identity.provider_id)
        .bind(&identity.password_hash)
        .bind(identity.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgOrganizations {
    pool: PgPool,
}

impl PgOrganizations {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrgRow {
    id: Uuid,
    name: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<OrgRow> for Organization {
    fn from(row: OrgRow) -> Self {
        Organization {
            id: row.id,
            name: row.name,
            status: match row.status.as_str() {
                "suspended" => OrganizationStatus::Suspended,
                _ => OrganizationStatus::Active,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl OrganizationRepository for PgOrganizations {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Organization>> {
        let row: Option<OrgRow> =
            sqlx::query_as("SELECT id, name, status, created_at FROM organizations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Organization::from))
    }

    async fn save(&self, org: &Organization) -> anyhow::Result<()> {
        let status = match org.status {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Suspended => "suspended",
        };
        sqlx::query(
            "INSERT INTO organizations (id, name, status, created_at) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, status = EXCLUDED.status",
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(status)
        .bind(org.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgMemberships {
    pool: PgPool,
}

impl PgMemberships {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MembershipRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Membership {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            role: match row.role.as_str() {
                "owner" => Role::Owner,
                "admin" => Role::Admin,
                _ => Role::Member,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MembershipRepository for PgMemberships {
    async fn find(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<Option<Membership>> {
        let row: Option<MembershipRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, role, created_at FROM memberships
             WHERE user_id = $1 AND org_id = $2",
        )
        .bind(user_id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Membership::from))
    }

    async fn list_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Membership>> {
        let rows: Vec<MembershipRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, role, created_at FROM memberships WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    async fn save(&self, membership: &Membership) -> anyhow::Result<()> {
        let role = match membership.role {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        };
        sqlx::query(
            "INSERT INTO memberships (id, user_id, org_id, role, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, org_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(membership.id)
        .bind(membership.user_id)
        .bind(membership.org_id)
        .bind(role)
        .bind(membership.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, user_id: Uuid, org_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM memberships WHERE user_id = $1 AND org_id = $2")
            .bind(user_id)
            .bind(org_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgDevices {
    pool: PgPool,
}

impl PgDevices {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    fingerprint: String,
    trusted: bool,
    trusted_until: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = anyhow::Error;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            fingerprint: DeviceFingerprint::new(row.fingerprint)?,
            trusted: row.trusted,
            trusted_until: row.trusted_until,
            revoked_at: row.revoked_at,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl DeviceRepository for PgDevices {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Device>> {
        let row: Option<DeviceRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, fingerprint, trusted, trusted_until, revoked_at,
                    last_seen_at, created_at
             FROM devices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Device::try_from).transpose()
    }

    async fn find_by_fingerprint(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        fingerprint: &DeviceFingerprint,
    ) -> anyhow::Result<Option<Device>> {
        let row: Option<DeviceRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, fingerprint, trusted, trusted_until, revoked_at,
                    last_seen_at, created_at
             FROM devices WHERE user_id = $1 AND org_id = $2 AND fingerprint = $3",
        )
        .bind(user_id)
        .bind(org_id)
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Device::try_from).transpose()
    }

    async fn save(&self, device: &Device) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO devices (id, user_id, org_id, fingerprint, trusted, trusted_until,
                                   revoked_at, last_seen_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET
                trusted = EXCLUDED.trusted,
                trusted_until = EXCLUDED.trusted_until,
                revoked_at = EXCLUDED.revoked_at,
                last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(device.id)
        .bind(device.user_id)
        .bind(device.org_id)
        .bind(device.fingerprint.as_str())
        .bind(device.trusted)
        .bind(device.trusted_until)
        .bind(device.revoked_at)
        .bind(device.last_seen_at)
        .bind(device.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgSessions {
    pool: PgPool,
}

impl PgSessions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, org_id, device_id, expires_at, revoked_at,
                    revoked_reason, last_seen_at, ip_address, refresh_jti, refresh_token_hash,
                    refresh_family_id, refresh_generation, created_at";

fn revocation_reason_from_str(reason: &str) -> Option<RevocationReason> {
    match reason {
        "rotation" => Some(RevocationReason::Rotation),
        "reuse_detected" => Some(RevocationReason::ReuseDetected),
        "device_revoked" => Some(RevocationReason::DeviceRevoked),
        "replaced_by_new_token" => Some(RevocationReason::SessionReplaced),
        "password_change" => Some(RevocationReason::PasswordChange),
        "admin_password_reset" => Some(RevocationReason::AdminPasswordReset),
        "user_logout" => Some(RevocationReason::UserLogout),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    device_id: Uuid,
    expires_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_reason: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    ip_address: Option<String>,
    refresh_jti: Option<Uuid>,
    refresh_token_hash: Option<String>,
    refresh_family_id: Option<Uuid>,
    refresh_generation: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            device_id: row.device_id,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            revoked_reason: row.revoked_reason.as_deref().and_then(revocation_reason_from_str),
            last_seen_at: row.last_seen_at,
            ip_address: row.ip_address,
            refresh_jti: row.refresh_jti,
            refresh_token_hash: row.refresh_token_hash,
            refresh_family_id: row.refresh_family_id,
            refresh_generation: row.refresh_generation,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SessionRepository for PgSessions {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Session::from))
    }

    async fn find_by_refresh_jti(&self, jti: Uuid) -> anyhow::Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE refresh_jti = $1"
        ))
        .bind(jti)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn save(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, org_id, device_id, expires_at, revoked_at,
                                    revoked_reason, last_seen_at, ip_address, refresh_jti,
                                    refresh_token_hash, refresh_family_id, refresh_generation,
                                    created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (id) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                revoked_at = EXCLUDED.revoked_at,
                revoked_reason = EXCLUDED.revoked_reason,
                last_seen_at = EXCLUDED.last_seen_at,
                refresh_jti = EXCLUDED.refresh_jti,
                refresh_token_hash = EXCLUDED.refresh_token_hash,
                refresh_family_id = EXCLUDED.refresh_family_id,
                refresh_generation = EXCLUDED.refresh_generation",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.org_id)
        .bind(session.device_id)
        .bind(session.expires_at)
        .bind(session.revoked_at)
        .bind(session.revoked_reason.map(|reason| reason.as_str()))
        .bind(session.last_seen_at)
        .bind(&session.ip_address)
        .bind(session.refresh_jti)
        .bind(&session.refresh_token_hash)
        .bind(session.refresh_family_id)
        .bind(session.refresh_generation)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> anyhow::Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE user_id = $1 AND org_id = $2 AND revoked_at IS NULL AND expires_at > now()"
        ))
        .bind(user_id)
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn list_for_org(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE org_id = $1 AND ($2::uuid IS NULL OR user_id = $2)"
        ))
        .bind(org_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        now: DateTime<Utc>,
        reason: RevocationReason,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE sessions SET revoked_at = $3, revoked_reason = $4
             WHERE user_id = $1 AND org_id = $2 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(org_id)
        .bind(now)
        .bind(reason.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgMfaChallenges {
    pool: PgPool,
}

impl PgMfaChallenges {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MfaChallengeRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    device_id: Uuid,
    phone: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<MfaChallengeRow> for MfaChallenge {
    fn from(row: MfaChallengeRow) -> Self {
        MfaChallenge {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            device_id: row.device_id,
            phone: row.phone,
            code_hash: row.code_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MfaChallengeRepository for PgMfaChallenges {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaChallenge>> {
        let row: Option<MfaChallengeRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, device_id, phone, code_hash, expires_at, created_at
             FROM mfa_challenges WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MfaChallenge::from))
    }

    async fn save(&self, challenge: &MfaChallenge) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO mfa_challenges (id, user_id, org_id, device_id, phone, code_hash,
                                          expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(challenge.id)
        .bind(challenge.user_id)
        .bind(challenge.org_id)
        .bind(challenge.device_id)
        .bind(&challenge.phone)
        .bind(&challenge.code_hash)
        .bind(challenge.expires_at)
        .bind(challenge.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM mfa_challenges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgMfaIntents {
    pool: PgPool,
}

impl PgMfaIntents {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MfaIntentRow {
    id: Uuid,
    user_id: Uuid,
    org_id: Uuid,
    device_id: Uuid,
    expires_at: DateTime<Utc>,
}

impl From<MfaIntentRow> for MfaIntent {
    fn from(row: MfaIntentRow) -> Self {
        MfaIntent {
            id: row.id,
            user_id: row.user_id,
            org_id: row.org_id,
            device_id: row.device_id,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl MfaIntentRepository for PgMfaIntents {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<MfaIntent>> {
        let row: Option<MfaIntentRow> = sqlx::query_as(
            "SELECT id, user_id, org_id, device_id, expires_at FROM mfa_intents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MfaIntent::from))
    }

    async fn save(&self, intent: &MfaIntent) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO mfa_intents (id, user_id, org_id, device_id, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(intent.id)
        .bind(intent.user_id)
        .bind(intent.org_id)
        .bind(intent.device_id)
        .bind(intent.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM mfa_intents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgPolicies {
    pool: PgPool,
}

impl PgPolicies {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: Uuid,
    org_id: Uuid,
    rules: String,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<PolicyRow> for Policy {
    fn from(row: PolicyRow) -> Self {
        Policy {
            id: row.id,
            org_id: row.org_id,
            rules: row.rules,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PolicyRepository for PgPolicies {
    async fn list_enabled_for_org(&self, org_id: Uuid) -> anyhow::Result<Vec<Policy>> {
        let rows: Vec<PolicyRow> = sqlx::query_as(
            "SELECT id, org_id, rules, enabled, created_at FROM policies
             WHERE org_id = $1 AND enabled = true",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Policy::from).collect())
    }

    async fn save(&self, policy: &Policy) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO policies (id, org_id, rules, enabled, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET rules = EXCLUDED.rules, enabled = EXCLUDED.enabled",
        )
        .bind(policy.id)
        .bind(policy.org_id)
        .bind(&policy.rules)
        .bind(policy.enabled)
        .bind(policy.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgOrgSettings {
    pool: PgPool,
}

impl PgOrgSettings {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrgMfaSettingsRow {
    org_id: Uuid,
    mfa_required_for_new_device: bool,
    mfa_required_for_untrusted: bool,
    mfa_required_always: bool,
    register_trust_after_mfa: bool,
    trust_ttl_days: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrgMfaSettingsRow> for OrgMfaSettings {
    fn from(row: OrgMfaSettingsRow) -> Self {
        OrgMfaSettings {
            org_id: row.org_id,
            mfa_required_for_new_device: row.mfa_required_for_new_device,
            mfa_required_for_untrusted: row.mfa_required_for_untrusted,
            mfa_required_always: row.mfa_required_always,
            register_trust_after_mfa: row.register_trust_after_mfa,
            trust_ttl_days: row.trust_ttl_days,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl OrgSettingsRepository for PgOrgSettings {
    async fn get_mfa_settings(&self, org_id: Uuid) -> anyhow::Result<Option<OrgMfaSettings>> {
        let row: Option<OrgMfaSettingsRow> = sqlx::query_as(
            "SELECT org_id, mfa_required_for_new_device, mfa_required_for_untrusted,
                    mfa_required_always, register_trust_after_mfa, trust_ttl_days,
                    created_at, updated_at
             FROM org_mfa_settings WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(OrgMfaSettings::from))
    }

    async fn get_policy_config(&self, org_id: Uuid) -> anyhow::Result<Option<OrgPolicyConfig>> {
        let row: Option<(Uuid, Value, DateTime<Utc>)> = sqlx::query_as(
            "SELECT org_id, config, updated_at FROM org_policy_configs WHERE org_id = $1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(org_id, config, updated_at)| {
            Ok(OrgPolicyConfig {
                org_id,
                config: serde_json::from_value(config)?,
                updated_at,
            })
        })
        .transpose()
    }

    /// Writes the config row and its projected MFA settings row in one
    /// transaction so a reader never observes one without the other.
    async fn update_policy_config(&self, config: &OrgPolicyConfig) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let config_json = serde_json::to_value(&config.config)?;
        sqlx::query(
            "INSERT INTO org_policy_configs (org_id, config, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (org_id) DO UPDATE SET config = EXCLUDED.config, updated_at = EXCLUDED.updated_at",
        )
        .bind(config.org_id)
        .bind(config_json)
        .bind(config.updated_at)
        .execute(&mut *tx)
        .await?;

        let mfa = config.project_mfa_settings();
        sqlx::query(
            "INSERT INTO org_mfa_settings (org_id, mfa_required_for_new_device,
                mfa_required_for_untrusted, mfa_required_always, register_trust_after_mfa,
                trust_ttl_days, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (org_id) DO UPDATE SET
                mfa_required_for_new_device = EXCLUDED.mfa_required_for_new_device,
                mfa_required_for_untrusted = EXCLUDED.mfa_required_for_untrusted,
                mfa_required_always = EXCLUDED.mfa_required_always,
                register_trust_after_mfa = EXCLUDED.register_trust_after_mfa,
                trust_ttl_days = EXCLUDED.trust_ttl_days,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(mfa.org_id)
        .bind(mfa.mfa_required_for_new_device)
        .bind(mfa.mfa_required_for_untrusted)
        .bind(mfa.mfa_required_always)
        .bind(mfa.register_trust_after_mfa)
        .bind(mfa.trust_ttl_days)
        .bind(mfa.created_at)
        .bind(mfa.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_platform_default_trust_ttl_days(&self) -> anyhow::Result<i64> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM platform_settings WHERE key = 'default_trust_ttl_days'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row
            .and_then(|(v,)| v.parse::<i64>().ok())
            .unwrap_or(30))
    }
}

pub struct PgAudit {
    pool: PgPool,
}

impl PgAudit {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    org_id: Option<Uuid>,
    user_id: Option<Uuid>,
    action: String,
    resource: String,
    ip: Option<String>,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditLog {
    fn from(row: AuditRow) -> Self {
        AuditLog {
            id: row.id,
            org_id: row.org_id,
            user_id: row.user_id,
            action: row.action,
            resource: row.resource,
            ip: row.ip,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuditRepository for PgAudit {
    async fn record(&self, entries: Vec<AuditLog>) -> anyhow::Result<()> {
        for entry in entries {
            sqlx::query(
                "INSERT INTO audit_logs (id, org_id, user_id, action, resource, ip, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(entry.id)
            .bind(entry.org_id)
            .bind(entry.user_id)
            .bind(&entry.action)
            .bind(&entry.resource)
            .bind(&entry.ip)
            .bind(&entry.metadata)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn list_for_org(
        &self,
        org_id: Uuid,
        user_id: Option<Uuid>,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Vec<AuditLog>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT id, org_id, user_id, action, resource, ip, metadata, created_at
             FROM audit_logs
             WHERE org_id = $1 AND ($2::uuid IS NULL OR user_id = $2)
             ORDER BY created_at DESC
             OFFSET $3 LIMIT $4",
        )
        .bind(org_id)
        .bind(user_id)
        .bind((page * page_size) as i64)
        .bind(page_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AuditLog::from).collect())
    }
}

/// Builds the full Postgres-backed `Repositories` bag from one pool.
pub fn postgres_repositories(pool: PgPool) -> super::Repositories {
    super::Repositories {
        users: std::sync::Arc::new(PgUsers::new(pool.clone())),
        identities: std::sync::Arc::new(PgIdentities::new(pool.clone())),
        organizations: std::sync::Arc::new(PgOrganizations::new(pool.clone())),
        memberships: std::sync::Arc::new(PgMemberships::new(pool.clone())),
        devices: std::sync::Arc::new(PgDevices::new(pool.clone())),
        sessions: std::sync::Arc::new(PgSessions::new(pool.clone())),
        mfa_challenges: std::sync::Arc::new(PgMfaChallenges::new(pool.clone())),
        mfa_intents: std::sync::Arc::new(PgMfaIntents::new(pool.clone())),
        policies: std::sync::Arc::new(PgPolicies::new(pool.clone())),
        org_settings: std::sync::Arc::new(PgOrgSettings::new(pool.clone())),
        audit: std::sync::Arc::new(PgAudit::new(pool)),
    }
}
