//! API Routes
//!
//! HTTP endpoint definitions. Every protected endpoint requires an
//! identity established by the auth middleware; collection endpoints are
//! gated by the role policy table and single-resource endpoints by the
//! resource authorization service.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{can_perform, Operation, ResourceAuthorization};
use crate::domain::{DomainError, RoleType, SegmentInput, SegmentRecord};
use crate::error::AppError;
use crate::handlers::{
    AuthHandler, CreateDepartmentCommand, DeactivateUserHandler, DepartmentHandler, LoginCommand,
    RegisterCommand, SegmentHandler, UpdateDepartmentCommand, UpdateUserCommand, UpdateUserHandler,
};

use super::middleware::CurrentUser;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: Uuid,
    pub email: String,
    pub role: RoleType,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub department_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub role: Option<RoleType>,
    #[serde(default)]
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DepartmentResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub manager_id: Option<Uuid>,
    pub manager_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateExpenseRequest {
    pub description: String,
    pub amount: String,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpenseRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub category_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_page() -> i64 {
    0
}

fn default_page_size() -> i64 {
    10
}

/// Zero-indexed page query for expense listings.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub size: i64,
}

#[derive(Debug, Serialize)]
pub struct PagedExpenseResponse {
    pub expenses: Vec<ExpenseResponse>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSegmentRequest {
    pub category: String,
    pub amount: String,
    #[serde(default)]
    pub percentage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceSegmentsRequest {
    pub segments: Vec<CreateSegmentRequest>,
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub category: String,
    pub amount: Decimal,
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttachmentRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

// =========================================================================
// Identity helpers
// =========================================================================

/// Unwrap the identity attached by the auth middleware, or 401.
fn require_identity(user: Option<Extension<CurrentUser>>) -> Result<CurrentUser, AppError> {
    user.map(|Extension(u)| u)
        .ok_or(AppError::AuthenticationRequired)
}

/// Check the role policy table, or 403.
fn require(user: &CurrentUser, operation: Operation) -> Result<(), AppError> {
    if can_perform(user.role, operation) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role {} may not perform this operation",
            user.role
        )))
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    let amount: Decimal = raw
        .parse()
        .map_err(|_| AppError::InvalidRequest("amount is not a valid decimal".to_string()))?;
    if amount <= Decimal::ZERO {
        return Err(AppError::InvalidRequest("amount must be positive".to_string()));
    }
    Ok(amount)
}

fn parse_percentage(raw: &str) -> Result<Decimal, AppError> {
    let percentage: Decimal = raw
        .parse()
        .map_err(|_| AppError::InvalidRequest("percentage is not a valid decimal".to_string()))?;
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(AppError::InvalidRequest(
            "percentage must be between 0 and 100".to_string(),
        ));
    }
    Ok(percentage)
}

fn parse_segment(request: CreateSegmentRequest) -> Result<SegmentInput, AppError> {
    if request.category.trim().is_empty() {
        return Err(AppError::InvalidRequest("category must not be empty".to_string()));
    }
    let amount = parse_amount(&request.amount)?;
    let percentage = request
        .percentage
        .as_deref()
        .map(parse_percentage)
        .transpose()?;
    Ok(SegmentInput {
        category: request.category,
        amount,
        percentage,
    })
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Auth endpoints (register/login are public; /auth/me is not)
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        // Role catalogue
        .route("/roles", get(list_roles))
        // User administration
        .route("/users", get(list_users))
        .route("/users/team", get(list_team))
        .route("/users/:user_id", patch(update_user))
        .route("/users/:user_id", delete(deactivate_user))
        // Departments
        .route("/departments", get(list_departments))
        .route("/departments", post(create_department))
        .route("/departments/:department_id", get(get_department))
        .route("/departments/:department_id", patch(update_department))
        // Categories
        .route("/categories", get(list_categories))
        .route("/categories", post(create_category))
        .route("/categories/:category_id", delete(deactivate_category))
        // Expenses
        .route("/expenses", get(list_expenses))
        .route("/expenses", post(create_expense))
        .route("/expenses/:expense_id", get(get_expense))
        .route("/expenses/:expense_id", patch(update_expense))
        .route("/expenses/:expense_id", delete(delete_expense))
        // Segments
        .route("/expenses/:expense_id/segments", get(list_segments))
        .route("/expenses/:expense_id/segments", post(create_segment))
        .route("/expenses/:expense_id/segments", put(replace_segments))
        // Attachments (metadata only)
        .route("/expenses/:expense_id/attachments", get(list_attachments))
        .route("/expenses/:expense_id/attachments", post(create_attachment))
        .route("/attachments/:attachment_id", get(get_attachment))
        .route("/attachments/:attachment_id", delete(delete_attachment))
}

// =========================================================================
// POST /auth/register
// =========================================================================

/// Register a new user account
async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let handler = AuthHandler::new(state.pool, state.tokens);

    let result = handler
        .register(RegisterCommand::new(request.name, request.email, request.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: result.token,
            user_id: result.user_id,
            email: result.email,
            role: result.role,
        }),
    ))
}

// =========================================================================
// POST /auth/login
// =========================================================================

/// Authenticate and obtain an access token
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let handler = AuthHandler::new(state.pool, state.tokens);

    let result = handler
        .login(LoginCommand::new(request.email, request.password))
        .await?;

    Ok(Json(AuthResponse {
        token: result.token,
        user_id: result.user_id,
        email: result.email,
        role: result.role,
    }))
}

// =========================================================================
// GET /auth/me
// =========================================================================

/// Return the authenticated user's own record
async fn me(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<UserResponse>, AppError> {
    let current = require_identity(user)?;
    fetch_user(&state, current.id).await.map(Json)
}

async fn fetch_user(state: &AppState, user_id: Uuid) -> Result<UserResponse, AppError> {
    let row: Option<(
        Uuid,
        String,
        String,
        String,
        Option<Uuid>,
        String,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT id, name, email, role, department_id, status, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.pool)
    .await?;

    let (id, name, email, role, department_id, status, created_at, updated_at) =
        row.ok_or_else(|| DomainError::not_found("User", user_id.to_string()))?;

    Ok(UserResponse {
        id,
        name,
        email,
        role,
        department_id,
        status,
        created_at,
        updated_at,
    })
}

// =========================================================================
// GET /roles
// =========================================================================

/// List the role catalogue
async fn list_roles(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<RoleResponse>>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ListRoles)?;

    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT name, description FROM roles ORDER BY name")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(name, description)| RoleResponse { name, description })
            .collect(),
    ))
}

// =========================================================================
// GET /users
// =========================================================================

/// List all users
async fn list_users(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageUsers)?;

    let rows: Vec<(
        Uuid,
        String,
        String,
        String,
        Option<Uuid>,
        String,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT id, name, email, role, department_id, status, created_at, updated_at
        FROM users
        ORDER BY created_at
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(user_row_to_response).collect()))
}

fn user_row_to_response(
    row: (
        Uuid,
        String,
        String,
        String,
        Option<Uuid>,
        String,
        DateTime<Utc>,
        DateTime<Utc>,
    ),
) -> UserResponse {
    let (id, name, email, role, department_id, status, created_at, updated_at) = row;
    UserResponse {
        id,
        name,
        email,
        role,
        department_id,
        status,
        created_at,
        updated_at,
    }
}

// =========================================================================
// GET /users/team
// =========================================================================

/// List the requester's department members (managers only)
async fn list_team(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ViewTeam)?;

    let department_id: Option<Uuid> =
        sqlx::query_scalar("SELECT department_id FROM users WHERE id = $1")
            .bind(current.id)
            .fetch_optional(&state.pool)
            .await?
            .flatten();

    let Some(department_id) = department_id else {
        return Ok(Json(Vec::new()));
    };

    let rows: Vec<(
        Uuid,
        String,
        String,
        String,
        Option<Uuid>,
        String,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT id, name, email, role, department_id, status, created_at, updated_at
        FROM users
        WHERE department_id = $1 AND status = 'ACTIVE'
        ORDER BY name
        "#,
    )
    .bind(department_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(user_row_to_response).collect()))
}

// =========================================================================
// PATCH /users/:user_id
// =========================================================================

/// Change a user's role and/or department assignment
async fn update_user(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageUsers)?;

    let handler = UpdateUserHandler::new(state.pool.clone());

    let mut command = UpdateUserCommand::new(user_id);
    command.role = request.role;
    command.department_id = request.department_id;

    handler.execute(command).await?;

    fetch_user(&state, user_id).await.map(Json)
}

// =========================================================================
// DELETE /users/:user_id
// =========================================================================

/// Deactivate a user (soft delete)
async fn deactivate_user(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageUsers)?;

    let handler = DeactivateUserHandler::new(state.pool);
    handler.execute(user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /departments
// =========================================================================

/// List departments
async fn list_departments(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<DepartmentResponse>>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ViewDepartments)?;

    let rows: Vec<(
        Uuid,
        String,
        String,
        Option<Uuid>,
        Option<String>,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT d.id, d.name, d.code, d.manager_id, m.name, d.created_at, d.updated_at
        FROM departments d
        LEFT JOIN users m ON m.id = d.manager_id
        ORDER BY d.name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter().map(department_row_to_response).collect(),
    ))
}

fn department_row_to_response(
    row: (
        Uuid,
        String,
        String,
        Option<Uuid>,
        Option<String>,
        DateTime<Utc>,
        DateTime<Utc>,
    ),
) -> DepartmentResponse {
    let (id, name, code, manager_id, manager_name, created_at, updated_at) = row;
    DepartmentResponse {
        id,
        name,
        code,
        manager_id,
        manager_name,
        created_at,
        updated_at,
    }
}

// =========================================================================
// POST /departments
// =========================================================================

/// Create a department, optionally with an initial manager
async fn create_department(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(request): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<DepartmentResponse>), AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageDepartments)?;

    let handler = DepartmentHandler::new(state.pool);

    let department = handler
        .create(CreateDepartmentCommand {
            name: request.name,
            code: request.code,
            manager_id: request.manager_id,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DepartmentResponse {
            id: department.id,
            name: department.name,
            code: department.code,
            manager_id: department.manager_id,
            manager_name: department.manager_name,
            created_at: department.created_at,
            updated_at: department.updated_at,
        }),
    ))
}

// =========================================================================
// GET /departments/:department_id
// =========================================================================

/// Get a department by ID
async fn get_department(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(department_id): Path<Uuid>,
) -> Result<Json<DepartmentResponse>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ViewDepartments)?;

    let row: Option<(
        Uuid,
        String,
        String,
        Option<Uuid>,
        Option<String>,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT d.id, d.name, d.code, d.manager_id, m.name, d.created_at, d.updated_at
        FROM departments d
        LEFT JOIN users m ON m.id = d.manager_id
        WHERE d.id = $1
        "#,
    )
    .bind(department_id)
    .fetch_optional(&state.pool)
    .await?;

    let row = row.ok_or_else(|| DomainError::not_found("Department", department_id.to_string()))?;

    Ok(Json(department_row_to_response(row)))
}

// =========================================================================
// PATCH /departments/:department_id
// =========================================================================

/// Update a department's name and/or manager
async fn update_department(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(department_id): Path<Uuid>,
    Json(request): Json<UpdateDepartmentRequest>,
) -> Result<Json<DepartmentResponse>, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageDepartments)?;

    let handler = DepartmentHandler::new(state.pool);

    let department = handler
        .update(UpdateDepartmentCommand {
            department_id,
            name: request.name,
            manager_id: request.manager_id,
        })
        .await?;

    Ok(Json(DepartmentResponse {
        id: department.id,
        name: department.name,
        code: department.code,
        manager_id: department.manager_id,
        manager_name: department.manager_name,
        created_at: department.created_at,
        updated_at: department.updated_at,
    }))
}

// =========================================================================
// GET /categories
// =========================================================================

/// List active categories (any authenticated user)
async fn list_categories(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> Result<Json<Vec<CategoryResponse>>, AppError> {
    require_identity(user)?;

    let rows: Vec<(Uuid, String, Option<String>, bool, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, name, description, is_active, created_at
        FROM categories
        WHERE is_active = true
        ORDER BY name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|(id, name, description, is_active, created_at)| CategoryResponse {
                id,
                name,
                description,
                is_active,
                created_at,
            })
            .collect(),
    ))
}

// =========================================================================
// POST /categories
// =========================================================================

/// Create a category
async fn create_category(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageCategories)?;

    if request.name.trim().is_empty() {
        return Err(AppError::InvalidRequest("name must not be empty".to_string()));
    }

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM categories WHERE name = $1")
        .bind(&request.name)
        .fetch_optional(&state.pool)
        .await?;

    if existing.is_some() {
        return Err(DomainError::duplicate("category", "name", &request.name).into());
    }

    let category_id = Uuid::new_v4();

    let (id, name, description, is_active, created_at): (
        Uuid,
        String,
        Option<String>,
        bool,
        DateTime<Utc>,
    ) = sqlx::query_as(
        r#"
        INSERT INTO categories (id, name, description, is_active, created_at)
        VALUES ($1, $2, $3, true, NOW())
        RETURNING id, name, description, is_active, created_at
        "#,
    )
    .bind(category_id)
    .bind(&request.name)
    .bind(&request.description)
    .fetch_one(&state.pool)
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CategoryResponse {
            id,
            name,
            description,
            is_active,
            created_at,
        }),
    ))
}

// =========================================================================
// DELETE /categories/:category_id
// =========================================================================

/// Deactivate a category (soft delete)
async fn deactivate_category(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(category_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = require_identity(user)?;
    require(&current, Operation::ManageCategories)?;

    let updated = sqlx::query("UPDATE categories SET is_active = false WHERE id = $1")
        .bind(category_id)
        .execute(&state.pool)
        .await?;

    if updated.rows_affected() == 0 {
        return Err(DomainError::not_found("Category", category_id.to_string()).into());
    }

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /expenses
// =========================================================================

/// List expenses page by page: the requester's own, or every expense for
/// roles allowed to view all
async fn list_expenses(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedExpenseResponse>, AppError> {
    let current = require_identity(user)?;

    let page = query.page.max(0);
    let size = query.size.clamp(1, 100);
    let offset = page * size;

    let view_all = can_perform(current.role, Operation::ViewAllExpenses);

    let total_elements: i64 = if view_all {
        sqlx::query_scalar("SELECT COUNT(*) FROM expenses")
            .fetch_one(&state.pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE created_by = $1")
            .bind(current.id)
            .fetch_one(&state.pool)
            .await?
    };

    let rows: Vec<(
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = if view_all {
        sqlx::query_as(
            r#"
            SELECT id, description, amount, category_id, created_by, created_at, updated_at
            FROM expenses
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(size)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            SELECT id, description, amount, category_id, created_by, created_at, updated_at
            FROM expenses
            WHERE created_by = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(current.id)
        .bind(size)
        .bind(offset)
        .fetch_all(&state.pool)
        .await?
    };

    Ok(Json(PagedExpenseResponse {
        expenses: rows.into_iter().map(expense_row_to_response).collect(),
        page,
        size,
        total_elements,
        total_pages: (total_elements + size - 1) / size,
    }))
}

fn expense_row_to_response(
    row: (
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    ),
) -> ExpenseResponse {
    let (id, description, amount, category_id, created_by, created_at, updated_at) = row;
    ExpenseResponse {
        id,
        description,
        amount,
        category_id,
        created_by,
        created_at,
        updated_at,
    }
}

// =========================================================================
// POST /expenses
// =========================================================================

/// Create an expense owned by the requester
async fn create_expense(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(request): Json<CreateExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseResponse>), AppError> {
    let current = require_identity(user)?;

    if request.description.trim().is_empty() {
        return Err(AppError::InvalidRequest("description must not be empty".to_string()));
    }
    let amount = parse_amount(&request.amount)?;

    if let Some(category_id) = request.category_id {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1 AND is_active = true)",
        )
        .bind(category_id)
        .fetch_one(&state.pool)
        .await?;
        if !exists {
            return Err(DomainError::not_found("Category", category_id.to_string()).into());
        }
    }

    let expense_id = Uuid::new_v4();

    let row: (
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    ) = sqlx::query_as(
        r#"
        INSERT INTO expenses (id, description, amount, category_id, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING id, description, amount, category_id, created_by, created_at, updated_at
        "#,
    )
    .bind(expense_id)
    .bind(&request.description)
    .bind(amount)
    .bind(request.category_id)
    .bind(current.id)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(expense_row_to_response(row))))
}

// =========================================================================
// GET /expenses/:expense_id
// =========================================================================

/// Get an expense by ID. Existence is checked before authorization so a
/// missing expense is 404 and a foreign one 403.
async fn get_expense(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<ExpenseResponse>, AppError> {
    let current = require_identity(user)?;

    let row = fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_view_expense(expense_id, &current.email).await? {
        return Err(AppError::Forbidden("not allowed to view this expense".to_string()));
    }

    Ok(Json(expense_row_to_response(row)))
}

async fn fetch_expense(
    state: &AppState,
    expense_id: Uuid,
) -> Result<
    (
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    ),
    AppError,
> {
    let row: Option<(
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    )> = sqlx::query_as(
        r#"
        SELECT id, description, amount, category_id, created_by, created_at, updated_at
        FROM expenses
        WHERE id = $1
        "#,
    )
    .bind(expense_id)
    .fetch_optional(&state.pool)
    .await?;

    row.ok_or_else(|| DomainError::not_found("Expense", expense_id.to_string()).into())
}

// =========================================================================
// PATCH /expenses/:expense_id
// =========================================================================

/// Update an expense (owner, FINANCE, or ADMIN)
async fn update_expense(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
    Json(request): Json<UpdateExpenseRequest>,
) -> Result<Json<ExpenseResponse>, AppError> {
    let current = require_identity(user)?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_modify_expense(expense_id, &current.email).await? {
        return Err(AppError::Forbidden("not allowed to modify this expense".to_string()));
    }

    let amount = request.amount.as_deref().map(parse_amount).transpose()?;

    let row: (
        Uuid,
        String,
        Decimal,
        Option<Uuid>,
        Uuid,
        DateTime<Utc>,
        DateTime<Utc>,
    ) = sqlx::query_as(
        r#"
        UPDATE expenses
        SET description = COALESCE($1, description),
            amount = COALESCE($2, amount),
            category_id = COALESCE($3, category_id),
            updated_at = NOW()
        WHERE id = $4
        RETURNING id, description, amount, category_id, created_by, created_at, updated_at
        "#,
    )
    .bind(request.description)
    .bind(amount)
    .bind(request.category_id)
    .bind(expense_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(expense_row_to_response(row)))
}

// =========================================================================
// DELETE /expenses/:expense_id
// =========================================================================

/// Delete an expense (owner, FINANCE, or ADMIN)
async fn delete_expense(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = require_identity(user)?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_modify_expense(expense_id, &current.email).await? {
        return Err(AppError::Forbidden("not allowed to delete this expense".to_string()));
    }

    sqlx::query("DELETE FROM expense_attachments WHERE expense_id = $1")
        .bind(expense_id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM expense_segments WHERE expense_id = $1")
        .bind(expense_id)
        .execute(&state.pool)
        .await?;
    sqlx::query("DELETE FROM expenses WHERE id = $1")
        .bind(expense_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /expenses/:expense_id/segments
// =========================================================================

/// List an expense's segments. Segment visibility follows the expense
/// viewer set.
async fn list_segments(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Vec<SegmentResponse>>, AppError> {
    let current = require_identity(user)?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_view_segments(expense_id, &current.email).await? {
        return Err(AppError::Forbidden(
            "not allowed to view this expense's segments".to_string(),
        ));
    }

    let handler = SegmentHandler::new(state.pool.clone());
    let segments = handler.list(expense_id).await?;

    Ok(Json(segments.into_iter().map(segment_to_response).collect()))
}

fn segment_to_response(record: SegmentRecord) -> SegmentResponse {
    SegmentResponse {
        id: record.id,
        expense_id: record.expense_id,
        category: record.category,
        amount: record.amount,
        percentage: record.percentage,
        created_at: record.created_at,
    }
}

// =========================================================================
// POST /expenses/:expense_id/segments
// =========================================================================

/// Add the first segment to an unsegmented expense (owner, FINANCE, or
/// ADMIN)
async fn create_segment(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
    Json(request): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<SegmentResponse>), AppError> {
    let current = require_identity(user)?;

    let input = parse_segment(request)?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_modify_segments(expense_id, &current.email).await? {
        return Err(AppError::Forbidden(
            "not allowed to modify this expense's segments".to_string(),
        ));
    }

    let handler = SegmentHandler::new(state.pool.clone());
    let segment = handler.add(expense_id, input).await?;

    Ok((StatusCode::CREATED, Json(segment_to_response(segment))))
}

// =========================================================================
// PUT /expenses/:expense_id/segments
// =========================================================================

/// Replace an expense's whole segment set (owner, FINANCE, or ADMIN). The
/// new set must account for the full expense amount.
async fn replace_segments(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
    Json(request): Json<ReplaceSegmentsRequest>,
) -> Result<Json<Vec<SegmentResponse>>, AppError> {
    let current = require_identity(user)?;

    let inputs = request
        .segments
        .into_iter()
        .map(parse_segment)
        .collect::<Result<Vec<_>, _>>()?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_modify_segments(expense_id, &current.email).await? {
        return Err(AppError::Forbidden(
            "not allowed to modify this expense's segments".to_string(),
        ));
    }

    let handler = SegmentHandler::new(state.pool.clone());
    let segments = handler.replace(expense_id, inputs).await?;

    Ok(Json(segments.into_iter().map(segment_to_response).collect()))
}

// =========================================================================
// GET /expenses/:expense_id/attachments
// =========================================================================

/// List an expense's attachment metadata. Uses the narrower attachment
/// viewer set, so a MANAGER who can see the expense cannot see these.
async fn list_attachments(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<Vec<AttachmentResponse>>, AppError> {
    let current = require_identity(user)?;

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz
        .can_view_expense_attachments(expense_id, &current.email)
        .await?
    {
        return Err(AppError::Forbidden(
            "not allowed to view this expense's attachments".to_string(),
        ));
    }

    let rows: Vec<(Uuid, Uuid, String, String, i64, Uuid, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, expense_id, filename, content_type, size_bytes, uploaded_by, created_at
        FROM expense_attachments
        WHERE expense_id = $1
        ORDER BY created_at
        "#,
    )
    .bind(expense_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter().map(attachment_row_to_response).collect(),
    ))
}

fn attachment_row_to_response(
    row: (Uuid, Uuid, String, String, i64, Uuid, DateTime<Utc>),
) -> AttachmentResponse {
    let (id, expense_id, filename, content_type, size_bytes, uploaded_by, created_at) = row;
    AttachmentResponse {
        id,
        expense_id,
        filename,
        content_type,
        size_bytes,
        uploaded_by,
        created_at,
    }
}

// =========================================================================
// POST /expenses/:expense_id/attachments
// =========================================================================

/// Record attachment metadata against an expense (owner, FINANCE, or ADMIN)
async fn create_attachment(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(expense_id): Path<Uuid>,
    Json(request): Json<CreateAttachmentRequest>,
) -> Result<(StatusCode, Json<AttachmentResponse>), AppError> {
    let current = require_identity(user)?;

    if request.filename.trim().is_empty() {
        return Err(AppError::InvalidRequest("filename must not be empty".to_string()));
    }
    if request.size_bytes <= 0 {
        return Err(AppError::InvalidRequest("size_bytes must be positive".to_string()));
    }

    fetch_expense(&state, expense_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz.can_modify_expense(expense_id, &current.email).await? {
        return Err(AppError::Forbidden(
            "not allowed to attach files to this expense".to_string(),
        ));
    }

    let attachment_id = Uuid::new_v4();

    let row: (Uuid, Uuid, String, String, i64, Uuid, DateTime<Utc>) = sqlx::query_as(
        r#"
        INSERT INTO expense_attachments
            (id, expense_id, filename, content_type, size_bytes, uploaded_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING id, expense_id, filename, content_type, size_bytes, uploaded_by, created_at
        "#,
    )
    .bind(attachment_id)
    .bind(expense_id)
    .bind(&request.filename)
    .bind(&request.content_type)
    .bind(request.size_bytes)
    .bind(current.id)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(attachment_row_to_response(row))))
}

// =========================================================================
// GET /attachments/:attachment_id
// =========================================================================

/// Get attachment metadata by ID
async fn get_attachment(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(attachment_id): Path<Uuid>,
) -> Result<Json<AttachmentResponse>, AppError> {
    let current = require_identity(user)?;

    let row = fetch_attachment(&state, attachment_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz
        .can_view_attachment(attachment_id, &current.email)
        .await?
    {
        return Err(AppError::Forbidden("not allowed to view this attachment".to_string()));
    }

    Ok(Json(attachment_row_to_response(row)))
}

async fn fetch_attachment(
    state: &AppState,
    attachment_id: Uuid,
) -> Result<(Uuid, Uuid, String, String, i64, Uuid, DateTime<Utc>), AppError> {
    let row: Option<(Uuid, Uuid, String, String, i64, Uuid, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT id, expense_id, filename, content_type, size_bytes, uploaded_by, created_at
        FROM expense_attachments
        WHERE id = $1
        "#,
    )
    .bind(attachment_id)
    .fetch_optional(&state.pool)
    .await?;

    row.ok_or_else(|| DomainError::not_found("Attachment", attachment_id.to_string()).into())
}

// =========================================================================
// DELETE /attachments/:attachment_id
// =========================================================================

/// Delete attachment metadata (uploader, FINANCE, or ADMIN)
async fn delete_attachment(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(attachment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let current = require_identity(user)?;

    fetch_attachment(&state, attachment_id).await?;

    let authz = ResourceAuthorization::new(state.pool.clone());
    if !authz
        .can_delete_attachment(attachment_id, &current.email)
        .await?
    {
        return Err(AppError::Forbidden("not allowed to delete this attachment".to_string()));
    }

    sqlx::query("DELETE FROM expense_attachments WHERE id = $1")
        .bind(attachment_id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
