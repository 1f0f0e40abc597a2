//! Database module
//!
//! Database connection and migration utilities.

use sqlx::PgPool;

use crate::domain::RoleType;

/// Run database migrations
/// Note: We use raw SQL files in migrations/ directory
/// This function can be used to verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Simple connectivity check
    sqlx::query("SELECT 1")
        .execute(pool)
        .await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec![
        "roles",
        "users",
        "departments",
        "categories",
        "expenses",
        "expense_attachments",
        "expense_segments",
    ];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // Check that the role catalogue is seeded
    if !check_seed_roles(pool).await? {
        return Ok(false);
    }

    Ok(true)
}

/// Check that every role in the catalogue has a seeded row
async fn check_seed_roles(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for role in RoleType::ALL {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM roles WHERE name = $1)"
        )
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!(
                "Required role '{}' does not exist. Please run database seed.",
                role
            );
            return Ok(false);
        }
    }

    tracing::info!("Role catalogue verified: {} roles seeded", RoleType::ALL.len());
    Ok(true)
}
