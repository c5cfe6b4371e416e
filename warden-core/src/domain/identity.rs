use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Local,
    Oidc,
    Saml,
}

/// A `(user, provider)` credential binding. For `Local`, `password_hash`
/// is required; federated providers carry only a `provider_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: IdentityProvider,
    pub provider_id: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    pub fn local(user_id: Uuid, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider: IdentityProvider::Local,
            provider_id: user_id.to_string(),
            password_hash: Some(password_hash),
            created_at: Utc::now(),
        }
    }
}
