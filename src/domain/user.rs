//! User domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::RoleType;

/// Activity status of a user account. INACTIVE users cannot authenticate and
/// never pass authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a status tag outside {ACTIVE, INACTIVE}.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown user status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for UserStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A user row. Inside transactions this is the snapshot the transition
/// planner works against; in the API layer it backs user responses.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: RoleType,
    pub department_id: Option<Uuid>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!("ACTIVE".parse::<UserStatus>().unwrap(), UserStatus::Active);
        assert_eq!(
            "INACTIVE".parse::<UserStatus>().unwrap(),
            UserStatus::Inactive
        );
        assert!("SUSPENDED".parse::<UserStatus>().is_err());
    }
}
