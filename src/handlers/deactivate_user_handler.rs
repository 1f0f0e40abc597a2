//! User Deactivation Handler
//!
//! Deactivation is a soft delete: the row stays, the status flips to
//! INACTIVE, and any manager slot the user holds is released in the same
//! transaction so the slot is immediately free for a successor.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{plan_deactivation, DomainError, UserStatus};
use crate::error::AppResult;

use super::update_user_handler::{lock_department, lock_user};

// =========================================================================
// DeactivateUserHandler
// =========================================================================

/// Handler for user deactivation
pub struct DeactivateUserHandler {
    pool: PgPool,
}

impl DeactivateUserHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute the deactivation. Idempotent: deactivating an already
    /// INACTIVE user succeeds without touching any slot.
    pub async fn execute(&self, user_id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let user = lock_user(&mut tx, user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", user_id.to_string()))?;

        if user.status == UserStatus::Inactive {
            tx.commit().await?;
            return Ok(());
        }

        let department = match user.department_id {
            Some(dept_id) => lock_department(&mut tx, dept_id).await?,
            None => None,
        };

        if let Some(dept_id) = plan_deactivation(&user, department.as_ref()) {
            sqlx::query(
                "UPDATE departments SET manager_id = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(dept_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE users SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(UserStatus::Inactive.as_str())
            .bind(user.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user.id, "user deactivated");

        Ok(())
    }
}
