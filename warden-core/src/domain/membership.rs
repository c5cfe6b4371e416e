use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn is_admin_or_above(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, org_id: Uuid, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            org_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// An org must always retain at least one owner; callers removing or
/// demoting a membership must check this against the full member list.
pub fn would_leave_org_ownerless(members: &[Membership], removing: Uuid) -> bool {
    let owners_excluding: usize = members
        .iter()
        .filter(|m| m.role == Role::Owner && m.user_id != removing)
        .count();
    let removing_is_owner = members
        .iter()
        .any(|m| m.user_id == removing && m.role == Role::Owner);
    removing_is_owner && owners_excluding == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_last_owner_removal() {
        let org = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let members = vec![Membership::new(owner, org, Role::Owner)];
        assert!(would_leave_org_ownerless(&members, owner));
    }

    #[test]
    fn allows_removal_when_another_owner_remains() {
        let org = Uuid::new_v4();
        let owner1 = Uuid::new_v4();
        let owner2 = Uuid::new_v4();
        let members = vec![
            Membership::new(owner1, org, Role::Owner),
            Membership::new(owner2, org, Role::Owner),
        ];
        assert!(!would_leave_org_ownerless(&members, owner1));
    }
}
