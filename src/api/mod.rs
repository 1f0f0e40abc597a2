//! API module
//!
//! HTTP API endpoints and middleware.

use sqlx::PgPool;

use crate::auth::TokenService;

pub mod middleware;
pub mod routes;

pub use routes::create_router;

/// Shared application state threaded through the router and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(pool: PgPool, tokens: TokenService) -> Self {
        Self { pool, tokens }
    }
}
