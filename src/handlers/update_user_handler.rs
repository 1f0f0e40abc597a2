//! Role/Department Update Handler
//!
//! Applies role and department changes while keeping the manager-slot
//! invariant: at most one ACTIVE manager per department. All reads happen
//! under `FOR UPDATE` row locks and all writes land in one transaction, so
//! two concurrent promotions into the same department serialize and the
//! second one observes the first one's slot.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    plan_update, DepartmentRecord, DomainError, RoleChange, RoleType, UserRecord, UserStatus,
};
use crate::error::AppResult;

use super::{UpdateUserCommand, UpdateUserResult};

// =========================================================================
// Row locking helpers (shared with the deactivation/department handlers)
// =========================================================================

/// Read a user row under a `FOR UPDATE` lock.
pub(crate) async fn lock_user(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> AppResult<Option<UserRecord>> {
    let row: Option<(
        Uuid,
        String,
        String,
        String,
        Option<Uuid>,
        String,
        chrono::DateTime<chrono::Utc>,
        chrono::DateTime<chrono::Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT id, name, email, role, department_id, status, created_at, updated_at
        FROM users
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some((id, name, email, role, department_id, status, created_at, updated_at)) = row else {
        return Ok(None);
    };

    Ok(Some(UserRecord {
        id,
        name,
        email,
        role: role.parse::<RoleType>()?,
        department_id,
        status: status.parse::<UserStatus>()?,
        created_at,
        updated_at,
    }))
}

/// Read a department row (with its manager's name) under a `FOR UPDATE`
/// lock on the department row only.
pub(crate) async fn lock_department(
    tx: &mut Transaction<'_, Postgres>,
    department_id: Uuid,
) -> AppResult<Option<DepartmentRecord>> {
    let row: Option<(
        Uuid,
        String,
        String,
        Option<Uuid>,
        Option<String>,
        chrono::DateTime<chrono::Utc>,
        chrono::DateTime<chrono::Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT d.id, d.name, d.code, d.manager_id, m.name, d.created_at, d.updated_at
        FROM departments d
        LEFT JOIN users m ON m.id = d.manager_id
        WHERE d.id = $1
        FOR UPDATE OF d
        "#,
    )
    .bind(department_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(
        |(id, name, code, manager_id, manager_name, created_at, updated_at)| DepartmentRecord {
            id,
            name,
            code,
            manager_id,
            manager_name,
            created_at,
            updated_at,
        },
    ))
}

// =========================================================================
// Transition application
// =========================================================================

/// Validate and apply a role/department change inside the caller's
/// transaction. Department rows are locked in ascending id order so two
/// transactions touching the same pair of departments cannot deadlock.
pub(crate) async fn apply_role_change(
    tx: &mut Transaction<'_, Postgres>,
    command: &UpdateUserCommand,
) -> AppResult<UpdateUserResult> {
    let user = lock_user(tx, command.user_id)
        .await?
        .ok_or_else(|| DomainError::not_found("User", command.user_id.to_string()))?;

    let change = RoleChange {
        role: command.role,
        department_id: command.department_id,
    };

    // Lock every department touched by this change, in a stable order.
    let mut touched: Vec<Uuid> = user
        .department_id
        .into_iter()
        .chain(change.final_department_id(&user))
        .collect();
    touched.sort();
    touched.dedup();

    let mut locked: Vec<DepartmentRecord> = Vec::with_capacity(touched.len());
    for id in &touched {
        if let Some(dept) = lock_department(tx, *id).await? {
            locked.push(dept);
        }
    }

    // An explicitly requested department must exist even when the user is
    // not becoming a manager.
    if let Some(target_id) = command.department_id {
        if !locked.iter().any(|d| d.id == target_id) {
            return Err(DomainError::not_found("Department", target_id.to_string()).into());
        }
    }

    let old_department = user
        .department_id
        .and_then(|id| locked.iter().find(|d| d.id == id));
    let target_department = change
        .final_department_id(&user)
        .and_then(|id| locked.iter().find(|d| d.id == id));

    let plan = plan_update(&user, &change, old_department, target_department)?;

    if let Some(dept_id) = plan.clear_manager_of {
        sqlx::query("UPDATE departments SET manager_id = NULL, updated_at = NOW() WHERE id = $1")
            .bind(dept_id)
            .execute(&mut **tx)
            .await?;
    }

    sqlx::query(
        "UPDATE users SET role = $1, department_id = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(plan.final_role.as_str())
    .bind(plan.final_department_id)
    .bind(user.id)
    .execute(&mut **tx)
    .await?;

    if let Some(dept_id) = plan.set_manager_of {
        sqlx::query("UPDATE departments SET manager_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(user.id)
            .bind(dept_id)
            .execute(&mut **tx)
            .await?;
    }

    tracing::info!(
        user_id = %user.id,
        role = %plan.final_role,
        department_id = ?plan.final_department_id,
        "role change applied"
    );

    Ok(UpdateUserResult {
        user_id: user.id,
        role: plan.final_role,
        department_id: plan.final_department_id,
    })
}

// =========================================================================
// UpdateUserHandler
// =========================================================================

/// Handler for role/department updates
pub struct UpdateUserHandler {
    pool: PgPool,
}

impl UpdateUserHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute the update user command
    pub async fn execute(&self, command: UpdateUserCommand) -> AppResult<UpdateUserResult> {
        let mut tx = self.pool.begin().await?;
        let result = apply_role_change(&mut tx, &command).await?;
        tx.commit().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_user_command_builder() {
        let user_id = Uuid::new_v4();
        let dept_id = Uuid::new_v4();
        let cmd = UpdateUserCommand::new(user_id)
            .with_role(RoleType::Manager)
            .with_department(dept_id);

        assert_eq!(cmd.role, Some(RoleType::Manager));
        assert_eq!(cmd.department_id, Some(dept_id));
    }
}
