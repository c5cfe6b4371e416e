use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::email::Email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Email,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub phone_verified: bool,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: Uuid, email: Email, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            email,
            name,
            phone: None,
            phone_verified: false,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active)
    }

    /// Phone becomes immutable once verified; callers must check this
    /// before writing a new value.
    pub fn can_set_phone(&self) -> bool {
        self.phone.is_none() || !self.phone_verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_is_settable_until_verified() {
        let mut user = User::new(Uuid::new_v4(), Email::parse("dev@example.com").unwrap(), None);
        assert!(user.can_set_phone());
        user.phone = Some("+10000000000".into());
        assert!(user.can_set_phone());
        user.phone_verified = true;
        assert!(!user.can_set_phone());
    }
}
