use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::device_fingerprint::DeviceFingerprint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub fingerprint: DeviceFingerprint,
    pub trusted: bool,
    pub trusted_until: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn new_untrusted(user_id: Uuid, org_id: Uuid, fingerprint: DeviceFingerprint) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            org_id,
            fingerprint,
            trusted: false,
            trusted_until: None,
            revoked_at: None,
            last_seen_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    /// `C5`: `trusted ∧ revoked_at = ∅ ∧ (trusted_until = ∅ ∨ trusted_until > now)`.
    pub fn effectively_trusted(&self, now: DateTime<Utc>) -> bool {
        self.trusted
            && self.revoked_at.is_none()
            && self.trusted_until.is_none_or(|until| until > now)
    }

    pub fn register_trust(&mut self, ttl_days: i64, now: DateTime<Utc>) {
        self.trusted = true;
        self.trusted_until = Some(now + Duration::days(ttl_days));
        self.revoked_at = None;
    }

    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.revoked_at = Some(now);
        self.trusted = false;
        self.trusted_until = None;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> DeviceFingerprint {
        DeviceFingerprint::new("fp1").unwrap()
    }

    #[test]
    fn untrusted_by_default() {
        let device = Device::new_untrusted(Uuid::new_v4(), Uuid::new_v4(), fingerprint());
        assert!(!device.effectively_trusted(Utc::now()));
    }

    #[test]
    fn trust_expires_after_ttl() {
        let mut device = Device::new_untrusted(Uuid::new_v4(), Uuid::new_v4(), fingerprint());
        let now = Utc::now();
        device.register_trust(30, now);
        assert!(device.effectively_trusted(now));
        assert!(!device.effectively_trusted(now + Duration::days(31)));
    }

    #[test]
    fn revocation_overrides_trust_until() {
        let mut device = Device::new_untrusted(Uuid::new_v4(), Uuid::new_v4(), fingerprint());
        let now = Utc::now();
        device.register_trust(30, now);
        device.revoke(now);
        assert!(!device.effectively_trusted(now));
        assert!(!device.trusted);
        assert!(device.trusted_until.is_none());
    }
}
