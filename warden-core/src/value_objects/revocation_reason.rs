use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical reasons a session or refresh token was revoked, kept
/// consistent across logging, audit metadata, and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Rotation,
    ReuseDetected,
    DeviceRevoked,
    SessionReplaced,
    PasswordChange,
    AdminPasswordReset,
    UserLogout,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotation => "rotation",
            Self::ReuseDetected => "reuse_detected",
            Self::DeviceRevoked => "device_revoked",
            Self::SessionReplaced => "replaced_by_new_token",
            Self::PasswordChange => "password_change",
            Self::AdminPasswordReset => "admin_password_reset",
            Self::UserLogout => "user_logout",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
