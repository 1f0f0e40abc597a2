//! Common test utilities

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use expense_segmentation::auth::{hash_password, TokenService};
use expense_segmentation::AppState;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Connect to the test database and truncate mutable tables. Returns None
/// when DATABASE_URL is not set so the suite can skip instead of fail on
/// machines without Postgres.
pub async fn try_setup_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping database-backed test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    // Clean up DB for fresh state; the seeded roles catalogue stays.
    sqlx::query(
        "TRUNCATE TABLE expense_segments, expense_attachments, expenses, categories, users, departments CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    Some(pool)
}

/// Application state with a fixed test signing key.
pub fn test_state(pool: PgPool) -> AppState {
    AppState::new(pool, TokenService::new(TEST_JWT_SECRET, 3_600_000))
}

/// Seed a user row directly, bypassing the register endpoint, so tests can
/// create non-EMPLOYEE users without a bootstrap admin.
pub async fn seed_user(pool: &PgPool, name: &str, email: &str, password: &str, role: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'ACTIVE', NOW(), NOW())
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(email)
    .bind(hash_password(password))
    .bind(role)
    .execute(pool)
    .await
    .expect("Failed to seed user");
    user_id
}
