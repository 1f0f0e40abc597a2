//! Department Handlers
//!
//! Department creation and update. Manager assignment always goes through
//! the role-change path, so the manager-slot invariant holds no matter
//! which endpoint initiated the assignment. A department whose slot is
//! occupied rejects a new manager; the incumbent must be demoted first.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{DepartmentRecord, DomainError, RoleType};
use crate::error::{AppError, AppResult};

use super::update_user_handler::{apply_role_change, lock_department};
use super::{CreateDepartmentCommand, UpdateDepartmentCommand, UpdateUserCommand};

// =========================================================================
// DepartmentHandler
// =========================================================================

/// Handler for department creation and update
pub struct DepartmentHandler {
    pool: PgPool,
}

impl DepartmentHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute the create department command
    pub async fn create(&self, command: CreateDepartmentCommand) -> AppResult<DepartmentRecord> {
        if command.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("name must not be empty".to_string()));
        }
        if command.code.trim().is_empty() {
            return Err(AppError::InvalidRequest("code must not be empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM departments WHERE code = $1")
                .bind(&command.code)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Err(DomainError::duplicate("department", "code", &command.code).into());
        }

        let department_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO departments (id, name, code, manager_id, created_at, updated_at)
            VALUES ($1, $2, $3, NULL, NOW(), NOW())
            "#,
        )
        .bind(department_id)
        .bind(&command.name)
        .bind(&command.code)
        .execute(&mut *tx)
        .await?;

        if let Some(manager_id) = command.manager_id {
            assign_manager(&mut tx, manager_id, department_id).await?;
        }

        let department = reload(&mut tx, department_id).await?;

        tx.commit().await?;

        tracing::info!(department_id = %department_id, code = %command.code, "department created");

        Ok(department)
    }

    /// Execute the update department command
    pub async fn update(&self, command: UpdateDepartmentCommand) -> AppResult<DepartmentRecord> {
        if let Some(name) = &command.name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidRequest("name must not be empty".to_string()));
            }
        }

        let mut tx = self.pool.begin().await?;

        // Manager assignment runs first: it locks the user row and then
        // department rows, the same order the user endpoints take. Locking
        // this department up front would invert that order against a
        // concurrent role change and deadlock.
        if let Some(manager_id) = command.manager_id {
            assign_manager(&mut tx, manager_id, command.department_id).await?;
        }

        let department = lock_department(&mut tx, command.department_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found("Department", command.department_id.to_string())
            })?;

        if let Some(name) = &command.name {
            sqlx::query("UPDATE departments SET name = $1, updated_at = NOW() WHERE id = $2")
                .bind(name)
                .bind(department.id)
                .execute(&mut *tx)
                .await?;
        }

        let department = reload(&mut tx, department.id).await?;

        tx.commit().await?;

        Ok(department)
    }
}

/// Promote `user_id` into the manager slot of `department_id` through the
/// transition planner. An occupied slot is rejected, never overwritten.
async fn assign_manager(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    department_id: Uuid,
) -> AppResult<()> {
    let command = UpdateUserCommand::new(user_id)
        .with_role(RoleType::Manager)
        .with_department(department_id);
    apply_role_change(tx, &command).await?;
    Ok(())
}

async fn reload(
    tx: &mut Transaction<'_, Postgres>,
    department_id: Uuid,
) -> AppResult<DepartmentRecord> {
    lock_department(tx, department_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Department", department_id.to_string()).into())
}
