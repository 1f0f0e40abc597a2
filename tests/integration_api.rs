//! API Integration Tests
//!
//! End-to-end coverage of registration, login, the role policy table, the
//! manager-slot invariant, and resource authorization. Every test builds
//! the full router with the auth middleware attached and drives it through
//! `tower::ServiceExt::oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use expense_segmentation::build_router;

mod common;

fn app_for(pool: sqlx::PgPool) -> Router {
    build_router(common::test_state(pool))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn create_department(app: &Router, admin_token: &str, name: &str, code: &str) -> Uuid {
    let (status, body) = send(
        app,
        "POST",
        "/departments",
        Some(admin_token),
        Some(json!({ "name": name, "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "department creation failed: {}", body);
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn patch_user(
    app: &Router,
    admin_token: &str,
    user_id: Uuid,
    body: Value,
) -> (StatusCode, Value) {
    send(
        app,
        "PATCH",
        &format!("/users/{}", user_id),
        Some(admin_token),
        Some(body),
    )
    .await
}

async fn create_expense(app: &Router, token: &str, description: &str, amount: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/expenses",
        Some(token),
        Some(json!({ "description": description, "amount": amount })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "expense creation failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn department_manager(app: &Router, token: &str, department_id: Uuid) -> Value {
    let (status, body) = send(
        app,
        "GET",
        &format!("/departments/{}", department_id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["manager_id"].clone()
}

#[tokio::test]
async fn test_register_login_and_me() {
    let Some(pool) = common::try_setup_db().await else { return };
    let app = app_for(pool);

    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "name": "Alice",
            "email": "alice@example.com",
            "password": "hunter22hunter22"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "EMPLOYEE");
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["status"], "ACTIVE");

    // Fresh login works too
    let token = login(&app, "alice@example.com", "hunter22hunter22").await;
    let (status, _) = send(&app, "GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_email_is_conflict() {
    let Some(pool) = common::try_setup_db().await else { return };
    let app = app_for(pool);

    let register = json!({
        "name": "Alice",
        "email": "alice@example.com",
        "password": "hunter22hunter22"
    });
    let (status, _) = send(&app, "POST", "/auth/register", None, Some(register.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "duplicate_resource");
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email_look_identical() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "correct-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let (status_a, body_a) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
    )
    .await;
    let (status_b, body_b) = send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "wrong-password" })),
    )
    .await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a["details"], body_b["details"]);
}

#[tokio::test]
async fn test_promote_without_department_rejected() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;

    let (status, body) = patch_user(&app, &admin, bob, json!({ "role": "MANAGER" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("must be assigned to a department"));
}

#[tokio::test]
async fn test_manager_slot_lifecycle() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    // Alice takes the slot
    let (status, body) = patch_user(
        &app,
        &admin,
        alice,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "promotion failed: {}", body);
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        alice.to_string()
    );

    // Bob cannot take an occupied slot; the error names the incumbent
    let (status, body) = patch_user(
        &app,
        &admin,
        bob,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_str().unwrap();
    assert!(details.contains("Engineering"));
    assert!(details.contains("Alice"));

    // The failed promotion left the slot untouched
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        alice.to_string()
    );

    // Demoting Alice frees the slot
    let (status, _) = patch_user(&app, &admin, alice, json!({ "role": "EMPLOYEE" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(department_manager(&app, &admin, engineering).await.is_null());

    // Now Bob's promotion goes through
    let (status, _) = patch_user(
        &app,
        &admin,
        bob,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        bob.to_string()
    );
}

#[tokio::test]
async fn test_manager_moving_departments_swaps_slots() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;
    let sales = create_department(&app, &admin, "Sales", "SAL").await;

    let (status, _) = patch_user(
        &app,
        &admin,
        alice,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Moving to Sales releases Engineering and occupies Sales atomically
    let (status, _) = patch_user(&app, &admin, alice, json!({ "department_id": sales })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(department_manager(&app, &admin, engineering).await.is_null());
    assert_eq!(department_manager(&app, &admin, sales).await, alice.to_string());
}

#[tokio::test]
async fn test_deactivation_releases_slot_and_identity() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    let (status, _) = patch_user(
        &app,
        &admin,
        alice,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let alice_token = login(&app, "alice@example.com", "alice-password").await;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/{}", alice),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Slot released in the same transaction
    assert!(department_manager(&app, &admin, engineering).await.is_null());

    // A structurally valid token no longer authenticates a deactivated user
    let (status, _) = send(&app, "GET", "/auth/me", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Deactivation is idempotent
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/{}", alice),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_department_manager_change_rejects_occupied_slot() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    let (status, _) = patch_user(
        &app,
        &admin,
        alice,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The department endpoint goes through the same planner: no overwrite
    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/departments/{}", engineering),
        Some(&admin),
        Some(json!({ "manager_id": bob })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("Alice"));
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        alice.to_string()
    );
}

#[tokio::test]
async fn test_expense_visibility_and_modification() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Mia", "mia@example.com", "mia-password", "MANAGER").await;
    common::seed_user(&pool, "Finn", "finn@example.com", "finn-password", "FINANCE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    let bob = login(&app, "bob@example.com", "bob-password").await;
    let mia = login(&app, "mia@example.com", "mia-password").await;
    let finn = login(&app, "finn@example.com", "finn-password").await;

    let (status, body) = send(
        &app,
        "POST",
        "/expenses",
        Some(&alice),
        Some(json!({ "description": "Taxi to airport", "amount": "42.50" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let expense_id = body["id"].as_str().unwrap().to_string();
    let uri = format!("/expenses/{}", expense_id);

    // Owner and the expense viewer set can read it; another employee cannot
    let (status, _) = send(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &uri, Some(&mia), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &uri, Some(&finn), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A missing expense is 404, not 403
    let (status, _) = send(
        &app,
        "GET",
        &format!("/expenses/{}", Uuid::new_v4()),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Modification: owner and FINANCE yes, MANAGER and other employees no
    let (status, body) = send(
        &app,
        "PATCH",
        &uri,
        Some(&finn),
        Some(json!({ "amount": "45.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], "45.00");

    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some(&mia),
        Some(json!({ "amount": "1.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "PATCH",
        &uri,
        Some(&bob),
        Some(json!({ "amount": "1.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Listing: employees see their own, FINANCE sees everything
    let (status, body) = send(&app, "GET", "/expenses", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_elements"], 0);
    let (status, body) = send(&app, "GET", "/expenses", Some(&finn), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 1);
    assert_eq!(body["total_elements"], 1);
}

#[tokio::test]
async fn test_attachment_access_is_narrower_than_expense_access() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Mia", "mia@example.com", "mia-password", "MANAGER").await;
    common::seed_user(&pool, "Finn", "finn@example.com", "finn-password", "FINANCE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    let mia = login(&app, "mia@example.com", "mia-password").await;
    let finn = login(&app, "finn@example.com", "finn-password").await;

    let (_, body) = send(
        &app,
        "POST",
        "/expenses",
        Some(&alice),
        Some(json!({ "description": "Team lunch", "amount": "120.00" })),
    )
    .await;
    let expense_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/expenses/{}/attachments", expense_id),
        Some(&alice),
        Some(json!({
            "filename": "receipt.pdf",
            "content_type": "application/pdf",
            "size_bytes": 18432
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let attachment_id = body["id"].as_str().unwrap().to_string();

    // MANAGER can see the expense but not its attachments
    let (status, _) = send(
        &app,
        "GET",
        &format!("/expenses/{}", expense_id),
        Some(&mia),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        "GET",
        &format!("/expenses/{}/attachments", expense_id),
        Some(&mia),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "GET",
        &format!("/attachments/{}", attachment_id),
        Some(&mia),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // FINANCE and the uploader can
    let (status, _) = send(
        &app,
        "GET",
        &format!("/attachments/{}", attachment_id),
        Some(&finn),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        "GET",
        &format!("/expenses/{}/attachments", expense_id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Deletion follows the editor set
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/attachments/{}", attachment_id),
        Some(&mia),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/attachments/{}", attachment_id),
        Some(&finn),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_collection_endpoints_follow_policy_table() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    common::seed_user(&pool, "Finn", "finn@example.com", "finn-password", "FINANCE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    let admin = login(&app, "admin@example.com", "admin-password").await;
    let finn = login(&app, "finn@example.com", "finn-password").await;

    // ManageUsers: ADMIN only
    let (status, _) = send(&app, "GET", "/users", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/users", Some(&finn), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    // ListRoles: FINANCE and ADMIN
    let (status, body) = send(&app, "GET", "/roles", Some(&finn), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);
    let (status, _) = send(&app, "GET", "/roles", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // ManageCategories: MANAGER/FINANCE/ADMIN, not EMPLOYEE
    let (status, _) = send(
        &app,
        "POST",
        "/categories",
        Some(&alice),
        Some(json!({ "name": "Travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        "POST",
        "/categories",
        Some(&finn),
        Some(json!({ "name": "Travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate category name is a conflict
    let (status, _) = send(
        &app,
        "POST",
        "/categories",
        Some(&finn),
        Some(json!({ "name": "Travel" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // ViewDepartments: FINANCE yes, EMPLOYEE no
    let (status, _) = send(&app, "GET", "/departments", Some(&finn), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/departments", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_team_listing_requires_manager() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    let (status, _) = patch_user(
        &app,
        &admin,
        alice,
        json!({ "role": "MANAGER", "department_id": engineering }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = patch_user(&app, &admin, bob, json!({ "department_id": engineering })).await;
    assert_eq!(status, StatusCode::OK);

    let alice_token = login(&app, "alice@example.com", "alice-password").await;
    let bob_token = login(&app, "bob@example.com", "bob-password").await;

    let (status, body) = send(&app, "GET", "/users/team", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    // ViewTeam is MANAGER-only; even ADMIN is absent from that allow-list
    let (status, _) = send(&app, "GET", "/users/team", Some(&bob_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, "GET", "/users/team", Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_change_takes_effect_on_next_request() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "FINANCE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let alice_token = login(&app, "alice@example.com", "alice-password").await;

    let (status, _) = send(&app, "GET", "/roles", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::OK);

    // Demote Alice; her existing token stays valid but her authority is
    // re-read from the database on every request.
    let (status, _) = patch_user(&app, &admin, alice, json!({ "role": "EMPLOYEE" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/roles", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_concurrent_promotions_elect_single_manager() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let alice =
        common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    // Two promotions race for the same empty slot on separate pool
    // connections. Exactly one wins; the loser sees the occupied slot.
    let promotion = json!({ "role": "MANAGER", "department_id": engineering });
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(
        patch_user(&app, &admin, alice, promotion.clone()),
        patch_user(&app, &admin, bob, promotion),
    );

    let statuses = [status_a, status_b];
    assert!(
        statuses.contains(&StatusCode::OK),
        "neither promotion succeeded: {} / {}",
        body_a,
        body_b
    );
    assert!(
        statuses.contains(&StatusCode::BAD_REQUEST),
        "both promotions succeeded: {} / {}",
        body_a,
        body_b
    );

    // The loser's rejection is the domain error, not a storage failure
    let loser_body = if status_a == StatusCode::OK { &body_b } else { &body_a };
    assert_eq!(loser_body["error_code"], "invalid_operation");

    let winner = if status_a == StatusCode::OK { alice } else { bob };
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        winner.to_string()
    );
}

#[tokio::test]
async fn test_concurrent_department_and_user_updates_serialize() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Admin", "admin@example.com", "admin-password", "ADMIN").await;
    let bob = common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let admin = login(&app, "admin@example.com", "admin-password").await;
    let engineering = create_department(&app, &admin, "Engineering", "ENG").await;

    // The department endpoint and the user endpoint both touch Bob and
    // Engineering at the same time. They must serialize on the user row
    // rather than abort each other; neither outcome is a storage error.
    let department_path = format!("/departments/{}", engineering);
    let ((status_a, body_a), (status_b, body_b)) = tokio::join!(
        send(
            &app,
            "PATCH",
            &department_path,
            Some(&admin),
            Some(json!({ "manager_id": bob })),
        ),
        patch_user(
            &app,
            &admin,
            bob,
            json!({ "role": "MANAGER", "department_id": engineering }),
        ),
    );

    // Whichever request lands second sees Bob already holding the slot,
    // which the planner treats as a no-op.
    assert_eq!(status_a, StatusCode::OK, "department update failed: {}", body_a);
    assert_eq!(status_b, StatusCode::OK, "user update failed: {}", body_b);
    assert_eq!(
        department_manager(&app, &admin, engineering).await,
        bob.to_string()
    );
}

#[tokio::test]
async fn test_expense_listing_pages() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    for i in 1..=3 {
        create_expense(&app, &alice, &format!("Expense {}", i), "10.00").await;
    }

    let (status, body) = send(&app, "GET", "/expenses?page=0&size=2", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 2);
    assert_eq!(body["page"], 0);
    assert_eq!(body["size"], 2);
    assert_eq!(body["total_elements"], 3);
    assert_eq!(body["total_pages"], 2);

    let (status, body) = send(&app, "GET", "/expenses?page=1&size=2", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 1);

    // A page past the end is empty but still reports the totals
    let (status, body) = send(&app, "GET", "/expenses?page=9&size=2", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 0);
    assert_eq!(body["total_elements"], 3);

    // Defaults: first page of ten
    let (status, body) = send(&app, "GET", "/expenses", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expenses"].as_array().unwrap().len(), 3);
    assert_eq!(body["size"], 10);
}

#[tokio::test]
async fn test_segments_follow_expense_access() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Bob", "bob@example.com", "bob-password", "EMPLOYEE").await;
    common::seed_user(&pool, "Mia", "mia@example.com", "mia-password", "MANAGER").await;
    common::seed_user(&pool, "Finn", "finn@example.com", "finn-password", "FINANCE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    let bob = login(&app, "bob@example.com", "bob-password").await;
    let mia = login(&app, "mia@example.com", "mia-password").await;
    let finn = login(&app, "finn@example.com", "finn-password").await;

    let expense_id = create_expense(&app, &alice, "Conference trip", "100.00").await;
    let uri = format!("/expenses/{}/segments", expense_id);

    // Another employee cannot seed segments; the owner can
    let (status, _) = send(
        &app,
        "POST",
        &uri,
        Some(&bob),
        Some(json!({ "category": "Travel", "amount": "100.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&alice),
        Some(json!({ "category": "Travel", "amount": "100.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "segment creation failed: {}", body);
    assert_eq!(body["percentage"], "100.00");

    // A second single addition is rejected; the set must be replaced
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&alice),
        Some(json!({ "category": "Meals", "amount": "10.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("already has segments"));

    // Viewing follows the expense viewer set
    let (status, body) = send(&app, "GET", &uri, Some(&mia), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, _) = send(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // FINANCE may replace the set; derived percentages come from the split
    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(&finn),
        Some(json!({ "segments": [
            { "category": "Meals", "amount": "60.00" },
            { "category": "Travel", "amount": "40.00" }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "segment replacement failed: {}", body);
    let segments = body.as_array().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["category"], "Meals");
    assert_eq!(segments[0]["percentage"], "60.00");
    assert_eq!(segments[1]["percentage"], "40.00");

    // MANAGER can view segments but not rewrite them
    let (status, _) = send(
        &app,
        "PUT",
        &uri,
        Some(&mia),
        Some(json!({ "segments": [{ "category": "Meals", "amount": "100.00" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_segment_amounts_validated_against_expense() {
    let Some(pool) = common::try_setup_db().await else { return };
    common::seed_user(&pool, "Alice", "alice@example.com", "alice-password", "EMPLOYEE").await;
    let app = app_for(pool);

    let alice = login(&app, "alice@example.com", "alice-password").await;
    let expense_id = create_expense(&app, &alice, "Team offsite", "100.00").await;
    let uri = format!("/expenses/{}/segments", expense_id);

    // A single segment may not exceed the expense amount
    let (status, body) = send(
        &app,
        "POST",
        &uri,
        Some(&alice),
        Some(json!({ "category": "Venue", "amount": "150.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("exceeds expense amount"));

    // A replacement set must account for the full amount
    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(&alice),
        Some(json!({ "segments": [{ "category": "Venue", "amount": "70.00" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("must equal expense amount"));

    // Duplicate categories are rejected before anything is written
    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some(&alice),
        Some(json!({ "segments": [
            { "category": "Venue", "amount": "50.00" },
            { "category": "venue", "amount": "50.00" }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].as_str().unwrap().contains("unique"));

    let (status, body) = send(&app, "GET", &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    // Segments against a missing expense are 404
    let (status, _) = send(
        &app,
        "GET",
        &format!("/expenses/{}/segments", Uuid::new_v4()),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
