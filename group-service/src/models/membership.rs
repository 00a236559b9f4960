//! Direct and effective membership models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Explicit (user, group) assignment as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DirectMembership {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub admin_flag: bool,
    pub admin_expires_utc: Option<DateTime<Utc>>,
}

impl DirectMembership {
    pub fn member(user_id: Uuid, group_id: Uuid) -> Self {
        Self {
            user_id,
            group_id,
            admin_flag: false,
            admin_expires_utc: None,
        }
    }

    pub fn admin(user_id: Uuid, group_id: Uuid, admin_expires_utc: Option<DateTime<Utc>>) -> Self {
        Self {
            user_id,
            group_id,
            admin_flag: true,
            admin_expires_utc,
        }
    }

    /// Admin privilege lapses at its expiry instant; membership does not.
    pub fn is_admin_at(&self, now: DateTime<Utc>) -> bool {
        self.admin_flag && self.admin_expires_utc.is_none_or(|expires| expires > now)
    }
}

/// Computed membership of a user in a group. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveMembership {
    pub user_id: Uuid,
    pub group_id: Uuid,
    pub direct: bool,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn plain_member_is_never_admin() {
        let m = DirectMembership::member(Uuid::new_v4(), Uuid::new_v4());
        assert!(!m.is_admin_at(Utc::now()));
    }

    #[test]
    fn admin_lapses_at_expiry() {
        let now = Utc::now();
        let m = DirectMembership::admin(Uuid::new_v4(), Uuid::new_v4(), Some(now));
        assert!(!m.is_admin_at(now));
        assert!(m.is_admin_at(now - Duration::minutes(1)));
    }

    #[test]
    fn admin_without_expiry_holds() {
        let m = DirectMembership::admin(Uuid::new_v4(), Uuid::new_v4(), None);
        assert!(m.is_admin_at(Utc::now()));
    }
}
