//! Role policy.
//!
//! Static operation -> allowed-role table, evaluated by set membership.
//! The role names imply a hierarchy (EMPLOYEE < MANAGER < FINANCE < ADMIN <
//! OWNER) but no permission is derived by comparing rank: every operation
//! carries its own exhaustive allow-list. A rank shortcut would silently
//! change behavior for roles not named in an entry (OWNER, for one, sits at
//! the top of the implied order and appears in no entry at all).

use crate::domain::RoleType;

/// Operations gated by role alone. Per-resource ownership checks live in
/// `auth::authorization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create or deactivate expense categories.
    ManageCategories,
    /// View the unfiltered expense list.
    ViewAllExpenses,
    /// Create and update departments.
    ManageDepartments,
    /// List and read departments.
    ViewDepartments,
    /// Role/department edits and deactivation of users.
    ManageUsers,
    /// View the members of one's own department.
    ViewTeam,
    /// List the role catalogue.
    ListRoles,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::ManageCategories,
        Operation::ViewAllExpenses,
        Operation::ManageDepartments,
        Operation::ViewDepartments,
        Operation::ManageUsers,
        Operation::ViewTeam,
        Operation::ListRoles,
    ];
}

/// The fixed allow-list for an operation.
pub fn allowed_roles(operation: Operation) -> &'static [RoleType] {
    use RoleType::{Admin, Finance, Manager};

    match operation {
        Operation::ManageCategories => &[Manager, Finance, Admin],
        Operation::ViewAllExpenses => &[Finance, Admin],
        Operation::ManageDepartments => &[Admin],
        Operation::ViewDepartments => &[Finance, Admin],
        Operation::ManageUsers => &[Admin],
        Operation::ViewTeam => &[Manager],
        Operation::ListRoles => &[Finance, Admin],
    }
}

/// Set-membership check against the table. No rank comparison, ever.
pub fn can_perform(role: RoleType, operation: Operation) -> bool {
    allowed_roles(operation).contains(&role)
}
