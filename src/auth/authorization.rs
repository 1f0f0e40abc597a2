//! Resource authorization.
//!
//! Ownership-plus-role checks for individual resources. The requester's
//! role and status are re-read from the database on every check, so a
//! mid-session role change takes effect on the very next check. A missing
//! resource or requester is a denial (`false`), not an error; only storage
//! failures propagate.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{RoleType, UserStatus};
use crate::error::AppResult;

/// Kind of resource being checked. Viewer sets differ by kind and are not
/// uniform across kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Expense,
    Attachment,
}

/// Roles that may view a resource of the given kind without owning it.
pub fn viewer_roles(kind: ResourceKind) -> &'static [RoleType] {
    use RoleType::{Admin, Finance, Manager};

    match kind {
        ResourceKind::Expense => &[Manager, Finance, Admin],
        // MANAGER is deliberately absent: attachment access is narrower
        // than expense access. Preserved as-is from the business policy.
        ResourceKind::Attachment => &[Finance, Admin],
    }
}

/// Roles that may modify, upload to, or delete a resource they do not own.
pub const EDITOR_ROLES: &[RoleType] = &[RoleType::Finance, RoleType::Admin];

/// Pure view decision: owner, or member of the kind's viewer set.
pub fn grants_view(owner: Uuid, requester: Uuid, role: RoleType, kind: ResourceKind) -> bool {
    requester == owner || viewer_roles(kind).contains(&role)
}

/// Pure modify/upload/delete decision: owner, or FINANCE/ADMIN.
pub fn grants_modify(owner: Uuid, requester: Uuid, role: RoleType) -> bool {
    requester == owner || EDITOR_ROLES.contains(&role)
}

/// Database-backed authorization checks for expenses and attachments.
#[derive(Debug, Clone)]
pub struct ResourceAuthorization {
    pool: PgPool,
}

impl ResourceAuthorization {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn can_view_expense(&self, expense_id: Uuid, email: &str) -> AppResult<bool> {
        let (Some(owner), Some((requester, role))) = (
            self.expense_owner(expense_id).await?,
            self.requester(email).await?,
        ) else {
            return Ok(false);
        };
        Ok(grants_view(owner, requester, role, ResourceKind::Expense))
    }

    pub async fn can_modify_expense(&self, expense_id: Uuid, email: &str) -> AppResult<bool> {
        let (Some(owner), Some((requester, role))) = (
            self.expense_owner(expense_id).await?,
            self.requester(email).await?,
        ) else {
            return Ok(false);
        };
        Ok(grants_modify(owner, requester, role))
    }

    /// Attachment views are checked against the uploader with the narrower
    /// attachment viewer set.
    pub async fn can_view_attachment(&self, attachment_id: Uuid, email: &str) -> AppResult<bool> {
        let (Some(uploader), Some((requester, role))) = (
            self.attachment_uploader(attachment_id).await?,
            self.requester(email).await?,
        ) else {
            return Ok(false);
        };
        Ok(grants_view(uploader, requester, role, ResourceKind::Attachment))
    }

    pub async fn can_delete_attachment(&self, attachment_id: Uuid, email: &str) -> AppResult<bool> {
        let (Some(uploader), Some((requester, role))) = (
            self.attachment_uploader(attachment_id).await?,
            self.requester(email).await?,
        ) else {
            return Ok(false);
        };
        Ok(grants_modify(uploader, requester, role))
    }

    /// Listing an expense's attachments uses the attachment viewer set
    /// against the expense owner.
    pub async fn can_view_expense_attachments(
        &self,
        expense_id: Uuid,
        email: &str,
    ) -> AppResult<bool> {
        let (Some(owner), Some((requester, role))) = (
            self.expense_owner(expense_id).await?,
            self.requester(email).await?,
        ) else {
            return Ok(false);
        };
        Ok(grants_view(owner, requester, role, ResourceKind::Attachment))
    }

    /// Segment access follows the expense: same viewer and editor sets.
    pub async fn can_view_segments(&self, expense_id: Uuid, email: &str) -> AppResult<bool> {
        self.can_view_expense(expense_id, email).await
    }

    pub async fn can_modify_segments(&self, expense_id: Uuid, email: &str) -> AppResult<bool> {
        self.can_modify_expense(expense_id, email).await
    }

    async fn requester(&self, email: &str) -> AppResult<Option<(Uuid, RoleType)>> {
        let row: Option<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, role, status FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(id, role, status)| {
            let role: RoleType = role.parse().ok()?;
            let status: UserStatus = status.parse().ok()?;
            (status == UserStatus::Active).then_some((id, role))
        }))
    }

    async fn expense_owner(&self, expense_id: Uuid) -> AppResult<Option<Uuid>> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT created_by FROM expenses WHERE id = $1")
                .bind(expense_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner)
    }

    async fn attachment_uploader(&self, attachment_id: Uuid) -> AppResult<Option<Uuid>> {
        let uploader: Option<Uuid> =
            sqlx::query_scalar("SELECT uploaded_by FROM expense_attachments WHERE id = $1")
                .bind(attachment_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(uploader)
    }
}
