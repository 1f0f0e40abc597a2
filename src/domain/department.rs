//! Department domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A department row, joined with the name of the user currently holding the
/// manager slot (needed when a rejection has to cite the incumbent).
#[derive(Debug, Clone)]
pub struct DepartmentRecord {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub manager_id: Option<Uuid>,
    pub manager_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
