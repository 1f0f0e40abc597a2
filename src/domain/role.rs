//! Role definitions
//!
//! The five roles are a closed set. The names suggest a seniority order, but
//! permissions are never derived by comparing rank; every operation carries
//! its own explicit allow-list (see `auth::policy`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role assigned to a user. Stored as its uppercase tag in the `users` table
/// and matched against per-operation allow-lists by set membership only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleType {
    Employee,
    Manager,
    Finance,
    Admin,
    Owner,
}

impl RoleType {
    /// All roles, in catalogue order.
    pub const ALL: [RoleType; 5] = [
        RoleType::Employee,
        RoleType::Manager,
        RoleType::Finance,
        RoleType::Admin,
        RoleType::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::Employee => "EMPLOYEE",
            RoleType::Manager => "MANAGER",
            RoleType::Finance => "FINANCE",
            RoleType::Admin => "ADMIN",
            RoleType::Owner => "OWNER",
        }
    }

    /// Human description, as seeded in the `roles` catalogue table.
    pub fn description(&self) -> &'static str {
        match self {
            RoleType::Employee => "Regular employee with basic access",
            RoleType::Manager => "Department manager with team management access",
            RoleType::Finance => "Finance team member with expense approval access",
            RoleType::Admin => "Administrator with full system access",
            RoleType::Owner => "Business owner with complete control",
        }
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a role tag outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for RoleType {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPLOYEE" => Ok(RoleType::Employee),
            "MANAGER" => Ok(RoleType::Manager),
            "FINANCE" => Ok(RoleType::Finance),
            "ADMIN" => Ok(RoleType::Admin),
            "OWNER" => Ok(RoleType::Owner),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}
