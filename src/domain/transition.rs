//! Manager-slot transition planning.
//!
//! A user's (role, department) pair moves between three states:
//! `{non-manager, no department}`, `{non-manager, has department}` and
//! `{manager, has department}`. `{manager, no department}` is unreachable;
//! any request that would produce it is rejected.
//!
//! Planning is pure. The handlers read row snapshots under row locks, ask
//! for a plan, then apply it inside the same transaction, so a rejection
//! never leaves a partial mutation behind.

use uuid::Uuid;

use super::{DepartmentRecord, DomainError, RoleType, UserRecord};

/// Requested role/department changes. `None` means "leave unchanged"; a
/// combined change resolves the final pair before any validation runs.
#[derive(Debug, Clone, Default)]
pub struct RoleChange {
    pub role: Option<RoleType>,
    pub department_id: Option<Uuid>,
}

impl RoleChange {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.department_id.is_none()
    }

    /// The department the user will belong to once the change is applied.
    pub fn final_department_id(&self, user: &UserRecord) -> Option<Uuid> {
        self.department_id.or(user.department_id)
    }
}

/// Writes required to apply a validated transition. Department slots are
/// only ever written through a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub final_role: RoleType,
    pub final_department_id: Option<Uuid>,
    /// Department whose manager slot must be set to NULL.
    pub clear_manager_of: Option<Uuid>,
    /// Department whose manager slot must be set to this user.
    pub set_manager_of: Option<Uuid>,
}

/// Validate a role/department change against the manager-slot invariant.
///
/// `old_department` is the snapshot of the user's current department (if
/// any); `target_department` the snapshot of the department the user will
/// end up in. Both must be read under row locks by the caller.
pub fn plan_update(
    user: &UserRecord,
    change: &RoleChange,
    old_department: Option<&DepartmentRecord>,
    target_department: Option<&DepartmentRecord>,
) -> Result<TransitionPlan, DomainError> {
    let final_role = change.role.unwrap_or(user.role);
    let final_department_id = change.final_department_id(user);

    let was_manager = user.role == RoleType::Manager;
    let will_be_manager = final_role == RoleType::Manager;

    if will_be_manager && final_department_id.is_none() {
        return Err(DomainError::invalid_operation(
            "User must be assigned to a department before being promoted to MANAGER role",
        ));
    }

    let mut plan = TransitionPlan {
        final_role,
        final_department_id,
        clear_manager_of: None,
        set_manager_of: None,
    };

    // Release the old slot on demotion or when the manager moves away.
    if was_manager {
        if let Some(old) = old_department {
            let holds_slot = old.manager_id == Some(user.id);
            let leaving = final_department_id != Some(old.id);
            if holds_slot && (!will_be_manager || leaving) {
                plan.clear_manager_of = Some(old.id);
            }
        }
    }

    if will_be_manager {
        let target = target_department.ok_or_else(|| {
            DomainError::not_found(
                "Department",
                final_department_id.map(|id| id.to_string()).unwrap_or_default(),
            )
        })?;

        match target.manager_id {
            Some(incumbent) if incumbent != user.id => {
                return Err(DomainError::invalid_operation(format!(
                    "Department '{}' already has a manager ({}). \
                     Please demote the current manager first.",
                    target.name,
                    target.manager_name.as_deref().unwrap_or("unknown"),
                )));
            }
            // Already holds the slot, nothing to write.
            Some(_) => {}
            None => plan.set_manager_of = Some(target.id),
        }
    }

    Ok(plan)
}

/// Department slot to clear when deactivating a user, if any.
pub fn plan_deactivation(user: &UserRecord, department: Option<&DepartmentRecord>) -> Option<Uuid> {
    match department {
        Some(dept) if user.role == RoleType::Manager && dept.manager_id == Some(user.id) => {
            Some(dept.id)
        }
        _ => None,
    }
}
