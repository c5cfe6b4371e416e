use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single-use OTP challenge bound to `(user, org, device, phone)`.
/// Deleted by the caller on successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaChallenge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub device_id: Uuid,
    pub phone: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MfaChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One-shot binding letting a phoneless user submit one before a
/// challenge is created; consumed on submission regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub device_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl MfaIntent {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Returns a masked phone suitable for returning to the client, e.g.
/// `+1********00`.
pub fn mask_phone(phone: &str) -> String {
    let len = phone.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let prefix: String = phone.chars().take(2).collect();
    let suffix: String = phone.chars().skip(len - 2).collect();
    format!("{prefix}{}{suffix}", "*".repeat(len - 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_middle_of_phone_number() {
        assert_eq!(mask_phone("+10000000000"), "+1********00");
    }

    #[test]
    fn masks_short_numbers_entirely() {
        assert_eq!(mask_phone("123"), "***");
    }
}
