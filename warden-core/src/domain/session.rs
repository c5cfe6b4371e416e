use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::revocation_reason::RevocationReason;

/// A live access/refresh pair. Exactly one refresh token is live per
/// session; rotating it updates `refresh_jti`/`refresh_token_hash`
/// together so a reader never observes a half-rotated pair.
/// `refresh_family_id`/`refresh_generation` survive rotation so a
/// presented refresh token can be recognised as belonging to a stale
/// generation of the same family even once its jti has been replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub device_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevocationReason>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub refresh_jti: Option<Uuid>,
    pub refresh_token_hash: Option<String>,
    pub refresh_family_id: Option<Uuid>,
    pub refresh_generation: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: Uuid,
        org_id: Uuid,
        device_id: Uuid,
        expires_at: DateTime<Utc>,
        ip_address: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            org_id,
            device_id,
            expires_at,
            revoked_at: None,
            revoked_reason: None,
            last_seen_at: Some(Utc::now()),
            ip_address,
            refresh_jti: None,
            refresh_token_hash: None,
            refresh_family_id: None,
            refresh_generation: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    pub fn bind_refresh(&mut self, jti: Uuid, hash: String, family_id: Uuid, generation: u32) {
        self.refresh_jti = Some(jti);
        self.refresh_token_hash = Some(hash);
        self.refresh_family_id = Some(family_id);
        self.refresh_generation = Some(generation as i32);
    }

    pub fn revoke(&mut self, now: DateTime<Utc>, reason: RevocationReason) {
        if self.revoked_at.is_none() {
            self.revoked_at = Some(now);
            self.revoked_reason = Some(reason);
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn active_only_while_unrevoked_and_unexpired() {
        let mut session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::hours(1),
            None,
        );
        assert!(session.is_active(Utc::now()));
        session.revoke(Utc::now(), RevocationReason::UserLogout);
        assert!(!session.is_active(Utc::now()));
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut session = Session::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::hours(1),
            None,
        );
        let now = Utc::now();
        session.revoke(now, RevocationReason::UserLogout);
        let first = session.revoked_at;
        session.revoke(now + Duration::seconds(5), RevocationReason::ReuseDetected);
        assert_eq!(session.revoked_at, first);
        assert_eq!(session.revoked_reason, Some(RevocationReason::UserLogout));
    }
}
