//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::RoleType;

// =========================================================================
// RegisterCommand
// =========================================================================

/// Command to register a new user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCommand {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterCommand {
    pub fn new(name: String, email: String, password: String) -> Self {
        Self { name, email, password }
    }
}

// =========================================================================
// LoginCommand
// =========================================================================

/// Command to authenticate with email and password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

impl LoginCommand {
    pub fn new(email: String, password: String) -> Self {
        Self { email, password }
    }
}

// =========================================================================
// UpdateUserCommand
// =========================================================================

/// Command to change a user's role and/or department assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserCommand {
    pub user_id: Uuid,
    /// New role, or None to keep the current role
    pub role: Option<RoleType>,
    /// New department, or None to keep the current assignment
    pub department_id: Option<Uuid>,
}

impl UpdateUserCommand {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: None,
            department_id: None,
        }
    }

    pub fn with_role(mut self, role: RoleType) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_department(mut self, department_id: Uuid) -> Self {
        self.department_id = Some(department_id);
        self
    }
}

// =========================================================================
// Department commands
// =========================================================================

/// Command to create a department
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepartmentCommand {
    pub name: String,
    pub code: String,
    /// Optional initial manager; assigned through the role-change path
    pub manager_id: Option<Uuid>,
}

/// Command to update a department's name and/or manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDepartmentCommand {
    pub department_id: Uuid,
    pub name: Option<String>,
    pub manager_id: Option<Uuid>,
}

// =========================================================================
// Results
// =========================================================================

/// Result of a successful register or login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub role: RoleType,
}

/// Result of a successful role/department change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserResult {
    pub user_id: Uuid,
    pub role: RoleType,
    pub department_id: Option<Uuid>,
}
