//! Registration and Login Handlers
//!
//! Registration creates an ACTIVE user with the default EMPLOYEE role.
//! Login verifies credentials and issues a signed access token. A missing
//! account and a wrong password produce the same error message so the
//! response does not reveal which one it was.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::domain::{RoleType, UserStatus};
use crate::error::{AppError, AppResult};

use super::{AuthResult, LoginCommand, RegisterCommand};

const INVALID_CREDENTIALS: &str = "invalid email or password";

// =========================================================================
// AuthHandler
// =========================================================================

/// Handler for registration and login
pub struct AuthHandler {
    pool: PgPool,
    tokens: TokenService,
}

impl AuthHandler {
    pub fn new(pool: PgPool, tokens: TokenService) -> Self {
        Self { pool, tokens }
    }

    /// Execute the register command
    pub async fn register(&self, command: RegisterCommand) -> AppResult<AuthResult> {
        if command.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("name must not be empty".to_string()));
        }
        if command.email.trim().is_empty() || !command.email.contains('@') {
            return Err(AppError::InvalidRequest("email is not valid".to_string()));
        }
        if command.password.len() < 8 {
            return Err(AppError::InvalidRequest(
                "password must be at least 8 characters".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(&command.email)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Err(crate::domain::DomainError::duplicate("user", "email", &command.email).into());
        }

        let user_id = Uuid::new_v4();
        let role = RoleType::Employee;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            "#,
        )
        .bind(user_id)
        .bind(&command.name)
        .bind(&command.email)
        .bind(hash_password(&command.password))
        .bind(role.as_str())
        .bind(UserStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, email = %command.email, "user registered");

        let token = self.tokens.issue(&command.email, role)?;

        Ok(AuthResult {
            token,
            user_id,
            email: command.email,
            role,
        })
    }

    /// Execute the login command
    pub async fn login(&self, command: LoginCommand) -> AppResult<AuthResult> {
        let row: Option<(Uuid, String, String, String)> = sqlx::query_as(
            "SELECT id, password_hash, role, status FROM users WHERE email = $1",
        )
        .bind(&command.email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((user_id, password_hash, role, status)) = row else {
            return Err(AppError::AuthenticationFailed(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(&command.password, &password_hash) {
            return Err(AppError::AuthenticationFailed(INVALID_CREDENTIALS.to_string()));
        }

        let status: UserStatus = status.parse()?;
        if status != UserStatus::Active {
            return Err(AppError::AuthenticationFailed("account is deactivated".to_string()));
        }

        let role: RoleType = role.parse()?;
        let token = self.tokens.issue(&command.email, role)?;

        Ok(AuthResult {
            token,
            user_id,
            email: command.email,
            role,
        })
    }
}
